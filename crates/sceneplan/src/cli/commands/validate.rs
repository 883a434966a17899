//! Validate command

use clap::Args;
use console::style;
use tracing::info;

use sceneplan_core::config::{load_config_from_dir, Config};

use crate::cli::{Cli, OutputFormat, Project};
use crate::exit_codes;

/// Validate configuration and the task graph
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Only validate the configuration file
    #[arg(long)]
    pub config_only: bool,

    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            config_only = self.config_only,
            strict = self.strict,
            "executing validate command"
        );
        let cwd = std::env::current_dir()?;

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Loading also validates
        let (config, config_path) = match load_config_from_dir(&cwd) {
            Ok((c, p)) => (Some(c), Some(p)),
            Err(e) => {
                errors.push(format!("Configuration: {}", e));
                (None, None)
            }
        };

        let mut task_count = None;
        if let (Some(config), Some(path)) = (config, config_path.clone()) {
            warnings.extend(config_warnings(&config));

            if !self.config_only {
                let project = Project {
                    root: path.parent().map(|p| p.to_path_buf()).unwrap_or(cwd),
                    config,
                    config_path: path,
                };
                match project.compose(false) {
                    Ok(composition) => task_count = Some(composition.graph.len()),
                    Err(e) => errors.push(format!("Task graph: {:#}", e)),
                }
            }
        }

        // If strict, promote warnings to errors
        if self.strict {
            errors.append(&mut warnings);
        }

        let passed = errors.is_empty();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": config_path.map(|p| p.to_string_lossy().to_string()),
                    "tasks": task_count,
                    "errors": errors,
                    "warnings": warnings
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", style("Validation Results").bold());
                    println!();

                    if let Some(path) = config_path {
                        println!("Config: {}", style(path.display()).cyan());
                    }
                    if let Some(count) = task_count {
                        println!("Tasks:  {}", count);
                    }
                    println!();

                    if !errors.is_empty() {
                        println!("{}", style("Errors:").red().bold());
                        for error in &errors {
                            println!("  {} {}", style("✗").red(), error);
                        }
                        println!();
                    }

                    if !warnings.is_empty() {
                        println!("{}", style("Warnings:").yellow().bold());
                        for warning in &warnings {
                            println!("  {} {}", style("!").yellow(), warning);
                        }
                        println!();
                    }

                    if passed {
                        if warnings.is_empty() {
                            println!("{}", style("✓ All checks passed").green().bold());
                        } else {
                            println!(
                                "{} with {} warning(s)",
                                style("✓ Validation passed").green().bold(),
                                warnings.len()
                            );
                        }
                    } else {
                        println!(
                            "{} with {} error(s)",
                            style("✗ Validation failed").red().bold(),
                            errors.len()
                        );
                    }
                }
            }
        }

        if !passed {
            std::process::exit(exit_codes::VALIDATION_ERROR);
        }

        Ok(())
    }
}

/// Suspicious but legal configuration
fn config_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.pipeline.is_empty() {
        warnings.push("No pipeline tasks defined".to_string());
    }
    if config.recipes.is_empty() {
        warnings.push("No recipes defined".to_string());
    }

    let mut names: Vec<&String> = config.pipeline.keys().collect();
    names.sort();
    for name in names {
        let task = &config.pipeline[name];
        if task.coverable && task.command.is_some() && task.scene_command.is_none() {
            warnings.push(format!(
                "pipeline.{}: coverable task has no scene_command; restoring it does nothing",
                name
            ));
        }
    }

    if !config.pipeline.contains_key(&config.tasks.default_task) && !config.pipeline.is_empty() {
        warnings.push(format!(
            "tasks.default_task '{}' is not a pipeline task",
            config.tasks.default_task
        ));
    }
    warnings
}
