//! Execution sinks: where task work actually happens

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::cache::{ArtifactStore, CacheError};
use crate::graph::TaskNode;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{Form, TaskId};

/// Errors reported by an execution sink
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("Failed to wait for command: {0}")]
    Wait(String),

    #[error("Command exited with code {code}: {stderr}")]
    ExitStatus { code: i32, stderr: String },

    #[error("Failed to record artifact: {0}")]
    Stamp(#[from] CacheError),

    #[error("{0}")]
    Other(String),
}

/// Performs the work of a task in a given form
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn execute(
        &self,
        node: &TaskNode,
        form: Form,
        reporter: &dyn TaskReporter,
    ) -> Result<(), ExecutionError>;
}

/// Sink that succeeds without doing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

#[async_trait]
impl ExecutionSink for DryRunSink {
    async fn execute(
        &self,
        node: &TaskNode,
        form: Form,
        _reporter: &dyn TaskReporter,
    ) -> Result<(), ExecutionError> {
        debug!(task = %node.executed_name(form), "dry run");
        Ok(())
    }
}

/// Runs task commands through `sh -c`.
///
/// The Real form runs `command`, the Scene form runs `scene_command`; a
/// missing command succeeds without work. Successful Real runs of coverable
/// tasks are stamped in the artifact store when one is attached.
#[derive(Debug, Clone)]
pub struct ShellSink {
    root_dir: PathBuf,
    store: Option<Arc<ArtifactStore>>,
}

impl ShellSink {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            store: None,
        }
    }

    /// Record stamps in `store` after successful Real runs
    pub fn with_store(mut self, store: Arc<ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl ExecutionSink for ShellSink {
    async fn execute(
        &self,
        node: &TaskNode,
        form: Form,
        reporter: &dyn TaskReporter,
    ) -> Result<(), ExecutionError> {
        if let Some(cmd) = node.definition.command_for(form) {
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(cmd)
                .current_dir(&self.root_dir)
                .envs(&node.definition.env)
                .env("SCENEPLAN_TASK", node.id.to_string())
                .env("SCENEPLAN_RECIPE", &node.id.recipe)
                .env("SCENEPLAN_FORM", form.as_str());
            run_shell_command(&node.id, command, reporter).await?;
        }

        if form == Form::Real && node.coverable {
            if let Some(store) = &self.store {
                store.record(&node.id, &node.definition)?;
            }
        }
        Ok(())
    }
}

/// Run a prepared shell command, streaming its output as events
async fn run_shell_command(
    id: &TaskId,
    mut command: Command,
    reporter: &dyn TaskReporter,
) -> Result<(), ExecutionError> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let read_stdout = async {
        if let Some(stdout) = stdout_handle {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                reporter.report(&TaskEvent::Output {
                    id: id.clone(),
                    line,
                    is_stderr: false,
                });
            }
        }
    };

    let read_stderr = async {
        let mut captured = Vec::new();
        if let Some(stderr) = stderr_handle {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                reporter.report(&TaskEvent::Output {
                    id: id.clone(),
                    line: line.clone(),
                    is_stderr: true,
                });
                captured.push(line);
            }
        }
        captured
    };

    let ((), stderr_lines) = tokio::join!(read_stdout, read_stderr);

    let status = child
        .wait()
        .await
        .map_err(|e| ExecutionError::Wait(e.to_string()))?;

    if status.success() {
        Ok(())
    } else {
        Err(ExecutionError::ExitStatus {
            code: status.code().unwrap_or(-1),
            stderr: stderr_lines.join("\n"),
        })
    }
}
