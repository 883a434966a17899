//! Exit codes for the CLI

use sceneplan_core::SceneplanError;
use sceneplan_tasks::{GraphError, TargetError};

use crate::cli::commands::RunFailed;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Malformed task graph or unknown target
pub const GRAPH_ERROR: i32 = 3;

/// One or more tasks failed, were blocked or skipped
pub const TASKS_FAILED: i32 = 4;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for an error returned by a command
pub fn for_error(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<RunFailed>().is_some() {
        TASKS_FAILED
    } else if error.downcast_ref::<SceneplanError>().is_some() {
        CONFIG_ERROR
    } else if error.downcast_ref::<GraphError>().is_some()
        || error.downcast_ref::<TargetError>().is_some()
    {
        GRAPH_ERROR
    } else if error.downcast_ref::<dialoguer::Error>().is_some() {
        CANCELLED
    } else {
        ERROR
    }
}
