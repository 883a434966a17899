//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Name accepted in `namespaces` lists for the default namespace
pub const DEFAULT_NAMESPACE_ALIAS: &str = "default";

/// Main configuration for sceneplan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Run settings
    pub tasks: TasksConfig,

    /// Task classes, keyed by task name
    pub pipeline: HashMap<String, PipelineTask>,

    /// Recipes instantiating the pipeline
    pub recipes: Vec<RecipeConfig>,

    /// Additional namespaces
    pub multiconfig: MulticonfigConfig,

    /// Artifact cache
    pub cache: CacheConfig,

    /// Restriction of Real execution
    pub enforcement: EnforcementConfig,
}

impl Config {
    /// Every namespace the configuration instantiates, default first
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces = vec![String::new()];
        for ns in &self.multiconfig.namespaces {
            if !namespaces.contains(ns) {
                namespaces.push(ns.clone());
            }
        }
        namespaces
    }

    /// Look up a recipe by name
    pub fn recipe(&self, name: &str) -> Option<&RecipeConfig> {
        self.recipes.iter().find(|r| r.name == name)
    }
}

/// Run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Maximum concurrent tasks (defaults to available parallelism)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Stop dispatching new work after the first failure
    pub stop_on_failure: bool,

    /// Task a bare recipe target expands to
    pub default_task: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            stop_on_failure: false,
            default_task: "build".to_string(),
        }
    }
}

/// A task class in the pipeline, instantiated once per recipe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTask {
    /// Tasks in the same recipe that must complete first
    pub depends_on: Vec<String>,

    /// Tasks consumed from every recipe dependency
    pub recipe_depends_on: Vec<String>,

    /// Tasks consumed from every recipe dependency that must really run
    pub hard_recipe_depends_on: Vec<String>,

    /// Whether the task's output can be restored from cache
    pub coverable: bool,

    /// Tasks in the same recipe consumed by the cache-restore form
    pub scene_depends_on: Vec<String>,

    /// Tasks consumed from every recipe dependency by the cache-restore form
    pub recipe_scene_depends_on: Vec<String>,

    /// Shell command for the Real form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Shell command for the cache-restore form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_command: Option<String>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// A recipe: one node per pipeline task it carries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeConfig {
    /// Recipe name
    pub name: String,

    /// Recipes this one builds on
    pub depends: Vec<String>,

    /// Pipeline tasks carried (all when empty)
    pub tasks: Vec<String>,

    /// Explicit edges to arbitrary tasks
    pub extra_depends: Vec<ExtraDependency>,

    /// Namespaces the recipe exists in (all when empty)
    pub namespaces: Vec<String>,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl RecipeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends: Vec::new(),
            tasks: Vec::new(),
            extra_depends: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    /// Whether the recipe is instantiated in `namespace` ("" is the default namespace)
    pub fn instantiated_in(&self, namespace: &str) -> bool {
        self.namespaces.is_empty()
            || self.namespaces.iter().any(|ns| {
                ns == namespace || (namespace.is_empty() && ns == DEFAULT_NAMESPACE_ALIAS)
            })
    }
}

/// An explicit dependency of one of a recipe's tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraDependency {
    /// Task of this recipe the edge starts from
    pub task: String,

    /// Target task id (`recipe:task` or `mc:<ns>:recipe:task`)
    pub on: String,

    /// Hard edge: the target must run for real
    #[serde(default)]
    pub hard: bool,
}

/// Multiconfig settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticonfigConfig {
    /// Additional namespaces built from the same recipes
    pub namespaces: Vec<String>,
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether stamps are consulted and recorded
    pub enabled: bool,

    /// Stamp directory, relative to the project root
    pub dir: PathBuf,

    /// Tasks always treated as having a valid artifact (glob patterns allowed)
    pub valid: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".sceneplan/stamps"),
            valid: Vec::new(),
        }
    }
}

/// Enforcement configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// Restrict Real execution to requested and allowed tasks
    pub enabled: bool,

    /// Tasks permitted to run for real (glob patterns allowed)
    pub allow: Vec<String>,
}
