//! Task lifecycle reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::closure::PruneReason;
use crate::task::{Coverage, Form, TaskId};

/// Events emitted while planning and executing a run
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A coverable task's coverage became known
    Classified { id: TaskId, coverage: Coverage },
    /// A validity query failed; the task counts as not covered
    OracleError { id: TaskId, error: String },
    /// A task's live form was decided
    FormAssigned { id: TaskId, form: Form },
    /// A task will not execute
    Pruned { id: TaskId, reason: PruneReason },
    /// All prerequisites of a live task are settled
    Runnable { id: TaskId, form: Form },
    /// A task was handed to the execution sink
    Started {
        id: TaskId,
        form: Form,
        /// Name the task executes under (the variant id for Scene)
        name: TaskId,
    },
    /// A task produced output
    Output {
        id: TaskId,
        line: String,
        is_stderr: bool,
    },
    /// A task completed successfully
    Completed {
        id: TaskId,
        form: Form,
        name: TaskId,
        duration: Duration,
    },
    /// A task failed
    Failed {
        id: TaskId,
        form: Form,
        name: TaskId,
        duration: Duration,
        error: String,
    },
    /// A task cannot run because a prerequisite failed
    Blocked { id: TaskId, dependency: TaskId },
    /// A task was never dispatched; `form` is `None` if it was never decided
    Skipped {
        id: TaskId,
        form: Option<Form>,
        reason: String,
    },
    /// The run finished
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        scene: usize,
        blocked: usize,
        skipped: usize,
        duration: Duration,
    },
}

impl TaskEvent {
    /// Task the event is about, if any
    pub fn task(&self) -> Option<&TaskId> {
        match self {
            Self::Classified { id, .. }
            | Self::OracleError { id, .. }
            | Self::FormAssigned { id, .. }
            | Self::Pruned { id, .. }
            | Self::Runnable { id, .. }
            | Self::Started { id, .. }
            | Self::Output { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Blocked { id, .. }
            | Self::Skipped { id, .. } => Some(id),
            Self::AllCompleted { .. } => None,
        }
    }
}

/// Trait for reporting run progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Classified { id, coverage } => {
                tracing::debug!("{} classified: {}", id, coverage);
            }
            TaskEvent::OracleError { id, error } => {
                tracing::warn!("Validity query for {} failed, treating as not covered: {}", id, error);
            }
            TaskEvent::FormAssigned { id, form } => {
                tracing::debug!("{} will run as {}", id, form);
            }
            TaskEvent::Pruned { id, reason } => match reason {
                PruneReason::Enforcement => tracing::info!("{} pruned: {}", id, reason),
                PruneReason::NotNeeded => tracing::debug!("{} pruned: {}", id, reason),
            },
            TaskEvent::Runnable { id, form } => {
                tracing::trace!("{} runnable ({})", id, form);
            }
            TaskEvent::Started { name, .. } => {
                tracing::info!("Starting {}", name);
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", id, line);
                } else {
                    tracing::debug!("[{}] {}", id, line);
                }
            }
            TaskEvent::Completed { name, duration, .. } => {
                tracing::info!("{} completed in {:.1}s", name, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                name,
                duration,
                error,
                ..
            } => {
                tracing::error!("{} failed after {:.1}s: {}", name, duration.as_secs_f64(), error);
            }
            TaskEvent::Blocked { id, dependency } => {
                tracing::warn!("{} blocked by failed dependency {}", id, dependency);
            }
            TaskEvent::Skipped { id, reason, .. } => {
                tracing::info!("{} skipped: {}", id, reason);
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                scene,
                blocked,
                skipped,
                duration,
            } => {
                tracing::info!(
                    "Run complete: {}/{} succeeded ({} from cache), {} failed, {} blocked, {} skipped ({:.1}s)",
                    succeeded,
                    total,
                    scene,
                    failed,
                    blocked,
                    skipped,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Names of started tasks, in start order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Started { name, .. } => Some(name.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Events about one task, in emission order
    pub fn events_for(&self, id: &TaskId) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task() == Some(id))
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Registry of task reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    /// Register an already shared reporter
    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &TaskId, form: Form) -> TaskEvent {
        let name = if form == Form::Scene {
            id.scene_variant()
        } else {
            id.clone()
        };
        TaskEvent::Started {
            id: id.clone(),
            form,
            name,
        }
    }

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let id = TaskId::new("a1", "package");

        reporter.report(&started(&id, Form::Scene));
        reporter.report(&TaskEvent::Completed {
            id: id.clone(),
            form: Form::Scene,
            name: id.scene_variant(),
            duration: Duration::from_secs(5),
        });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.started(), vec!["a1:package_setscene"]);
        assert_eq!(reporter.events_for(&id).len(), 2);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;
        let id = TaskId::new("a1", "compile");

        // Just verify it doesn't panic
        reporter.report(&started(&id, Form::Real));
        reporter.report(&TaskEvent::Pruned {
            id: id.clone(),
            reason: PruneReason::Enforcement,
        });
        reporter.report(&TaskEvent::AllCompleted {
            total: 1,
            succeeded: 1,
            failed: 0,
            scene: 0,
            blocked: 0,
            skipped: 0,
            duration: Duration::from_secs(1),
        });
    }

    #[test]
    fn test_event_task() {
        let id = TaskId::new("a1", "fetch");
        let event = TaskEvent::Blocked {
            id: id.clone(),
            dependency: TaskId::new("a1", "unpack"),
        };
        assert_eq!(event.task(), Some(&id));

        let done = TaskEvent::AllCompleted {
            total: 0,
            succeeded: 0,
            failed: 0,
            scene: 0,
            blocked: 0,
            skipped: 0,
            duration: Duration::ZERO,
        };
        assert!(done.task().is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskReporterRegistry::empty();
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = TaskReporterRegistry::empty();
        registry.register_shared(collecting.clone());
        registry.register(TracingReporter);

        registry.broadcast(&started(&TaskId::new("a1", "build"), Form::Real));

        assert_eq!(registry.all().len(), 2);
        assert_eq!(collecting.events().len(), 1);
    }
}
