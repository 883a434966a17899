//! sceneplan core - configuration and shared error types
//!
//! This crate loads and validates the `sceneplan.yaml` / `sceneplan.toml`
//! manifest that describes recipes, pipeline tasks, namespaces, the cache
//! and enforcement settings.

pub mod config;
pub mod error;

pub use config::{load_config, load_config_from_dir, Config};
pub use error::{ConfigError, Result, SceneplanError};
