//! Configuration validation

use std::collections::HashSet;

use globset::Glob;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, DEFAULT_NAMESPACE_ALIAS};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_pipeline(config)?;
    validate_recipes(config)?;
    validate_multiconfig(config)?;
    validate_patterns("cache.valid", &config.cache.valid)?;
    validate_patterns("enforcement.allow", &config.enforcement.allow)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    if config.tasks.concurrency == Some(0) {
        return Err(ConfigError::invalid("tasks.concurrency", "must be at least 1").into());
    }
    if config.tasks.default_task.trim().is_empty() {
        return Err(ConfigError::invalid("tasks.default_task", "cannot be empty").into());
    }
    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<()> {
    for (name, task) in &config.pipeline {
        if name.is_empty() || name.contains(':') {
            return Err(ConfigError::invalid(
                format!("pipeline.{}", name),
                "task names must be non-empty and cannot contain ':'",
            )
            .into());
        }

        let references = [
            ("depends_on", &task.depends_on),
            ("recipe_depends_on", &task.recipe_depends_on),
            ("hard_recipe_depends_on", &task.hard_recipe_depends_on),
            ("scene_depends_on", &task.scene_depends_on),
            ("recipe_scene_depends_on", &task.recipe_scene_depends_on),
        ];
        for (field, deps) in references {
            if let Some(unknown) = deps.iter().find(|d| !config.pipeline.contains_key(*d)) {
                return Err(ConfigError::invalid(
                    format!("pipeline.{}.{}", name, field),
                    format!("unknown pipeline task '{}'", unknown),
                )
                .into());
            }
        }

        if task.depends_on.contains(name) {
            return Err(ConfigError::invalid(
                format!("pipeline.{}.depends_on", name),
                "a task cannot depend on itself",
            )
            .into());
        }

        let scene_fields = !task.scene_depends_on.is_empty()
            || !task.recipe_scene_depends_on.is_empty()
            || task.scene_command.is_some();
        if !task.coverable && scene_fields {
            return Err(ConfigError::invalid(
                format!("pipeline.{}", name),
                "scene dependencies and scene_command require coverable = true",
            )
            .into());
        }
    }
    Ok(())
}

fn validate_recipes(config: &Config) -> Result<()> {
    if !config.recipes.is_empty() {
        debug!(count = config.recipes.len(), "validating recipes");
    }

    let mut names = HashSet::new();
    for (i, recipe) in config.recipes.iter().enumerate() {
        if recipe.name.is_empty() || recipe.name.contains(':') {
            return Err(ConfigError::invalid(
                format!("recipes[{}].name", i),
                "recipe names must be non-empty and cannot contain ':'",
            )
            .into());
        }
        if !names.insert(recipe.name.as_str()) {
            return Err(ConfigError::invalid(
                format!("recipes[{}].name", i),
                format!("duplicate recipe '{}'", recipe.name),
            )
            .into());
        }
    }

    let known_namespaces: HashSet<String> = config.namespaces().into_iter().collect();
    for (i, recipe) in config.recipes.iter().enumerate() {
        if let Some(unknown) = recipe.depends.iter().find(|d| !names.contains(d.as_str())) {
            return Err(ConfigError::invalid(
                format!("recipes[{}].depends", i),
                format!("unknown recipe '{}'", unknown),
            )
            .into());
        }
        if let Some(unknown) = recipe
            .tasks
            .iter()
            .find(|t| !config.pipeline.contains_key(*t))
        {
            return Err(ConfigError::invalid(
                format!("recipes[{}].tasks", i),
                format!("unknown pipeline task '{}'", unknown),
            )
            .into());
        }
        if let Some(unknown) = recipe
            .namespaces
            .iter()
            .find(|ns| *ns != DEFAULT_NAMESPACE_ALIAS && !known_namespaces.contains(*ns))
        {
            return Err(ConfigError::invalid(
                format!("recipes[{}].namespaces", i),
                format!("namespace '{}' is not declared in multiconfig.namespaces", unknown),
            )
            .into());
        }
        for (j, extra) in recipe.extra_depends.iter().enumerate() {
            let field = format!("recipes[{}].extra_depends[{}]", i, j);
            if !config.pipeline.contains_key(&extra.task) {
                return Err(ConfigError::invalid(
                    format!("{}.task", field),
                    format!("unknown pipeline task '{}'", extra.task),
                )
                .into());
            }
            if !extra.on.contains(':') {
                return Err(ConfigError::invalid(
                    format!("{}.on", field),
                    "expected recipe:task or mc:<namespace>:recipe:task",
                )
                .into());
            }
        }
    }
    Ok(())
}

fn validate_multiconfig(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();
    for (i, ns) in config.multiconfig.namespaces.iter().enumerate() {
        if ns.is_empty() || ns.contains(':') || ns == DEFAULT_NAMESPACE_ALIAS {
            return Err(ConfigError::invalid(
                format!("multiconfig.namespaces[{}]", i),
                format!(
                    "namespace names must be non-empty, cannot contain ':' and cannot be '{}'",
                    DEFAULT_NAMESPACE_ALIAS
                ),
            )
            .into());
        }
        if !seen.insert(ns) {
            return Err(ConfigError::invalid(
                format!("multiconfig.namespaces[{}]", i),
                format!("duplicate namespace '{}'", ns),
            )
            .into());
        }
    }
    Ok(())
}

fn validate_patterns(field: &str, patterns: &[String]) -> Result<()> {
    for (i, pattern) in patterns.iter().enumerate() {
        if let Err(e) = Glob::new(pattern) {
            return Err(ConfigError::invalid(format!("{}[{}]", field, i), e.to_string()).into());
        }
    }
    Ok(())
}
