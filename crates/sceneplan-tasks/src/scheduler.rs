//! Cache-aware task scheduler using tokio
//!
//! All run state lives in one owned context driven by a single loop.
//! Oracle queries and task executions run on spawned tasks and report back
//! over a channel, so each classification or completion and the ready-set
//! update it causes are applied as one step.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::closure::{ClosureEngine, LiveSet, PruneReason};
use crate::graph::{GraphError, TaskGraph};
use crate::oracle::{OracleError, Validity, ValidityOracle};
use crate::policy::EnforcementPolicy;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::sink::ExecutionSink;
use crate::task::{Form, TaskId};

/// Result of a single live task
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    /// Task that was scheduled
    pub id: TaskId,
    /// Form it was scheduled in, if decided
    pub form: Option<Form>,
    /// Outcome
    pub status: TaskStatus,
    /// How long the task ran
    pub duration: Duration,
}

impl TaskResult {
    /// Name the task executed under
    pub fn name(&self, graph: &TaskGraph) -> TaskId {
        match (self.form, graph.get(&self.id)) {
            (Some(form), Some(node)) => node.executed_name(form),
            _ => self.id.clone(),
        }
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum TaskStatus {
    /// Task completed successfully
    Success,
    /// Task failed
    Failed(String),
    /// A prerequisite failed
    Blocked(TaskId),
    /// Task was never dispatched
    Skipped(String),
}

impl TaskStatus {
    /// Check if this status represents success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Results of live tasks in topological order
    pub results: Vec<TaskResult>,
    /// Final forms
    pub live_set: LiveSet,
    /// Names actually handed to the sink, sorted
    executed: Vec<String>,
    /// Wall-clock time of the run
    pub duration: Duration,
}

impl RunReport {
    /// Names of the tasks that were executed, Scene tasks by variant id
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }

    pub fn result(&self, id: &TaskId) -> Option<&TaskResult> {
        self.results.iter().find(|r| &r.id == id)
    }

    pub fn count(&self, predicate: impl Fn(&TaskStatus) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.status)).count()
    }
}

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrent tasks
    pub concurrency: usize,
    /// Stop dispatching after the first failure
    pub stop_on_failure: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus(),
            stop_on_failure: false,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Task scheduler: plans the live set and executes it with bounded parallelism
pub struct TaskScheduler {
    options: SchedulerOptions,
    oracle: Arc<dyn ValidityOracle>,
    sink: Arc<dyn ExecutionSink>,
    reporter: Arc<dyn TaskReporter>,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(
        options: SchedulerOptions,
        oracle: Arc<dyn ValidityOracle>,
        sink: Arc<dyn ExecutionSink>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            options,
            oracle,
            sink,
            reporter,
        }
    }

    /// Build the requested tasks of a closed graph.
    ///
    /// Fails before anything is scheduled when the graph has unresolved
    /// dependencies or a requested task does not exist.
    pub async fn run(
        &self,
        graph: Arc<TaskGraph>,
        requested: &[TaskId],
        policy: EnforcementPolicy,
    ) -> Result<RunReport, GraphError> {
        graph.ensure_closed()?;

        let mut engine = ClosureEngine::new(Arc::clone(&graph), policy);
        for id in requested {
            engine.request(id)?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut run = Run {
            graph,
            engine,
            options: self.options.clone(),
            oracle: Arc::clone(&self.oracle),
            sink: Arc::clone(&self.sink),
            reporter: Arc::clone(&self.reporter),
            exec: Vec::new(),
            ready: VecDeque::new(),
            results: HashMap::new(),
            running: 0,
            queries_in_flight: 0,
            stopping: false,
            tx,
            rx,
        };
        run.exec = vec![ExecState::Undecided; run.graph.len()];

        info!(
            tasks = run.graph.len(),
            requested = requested.len(),
            concurrency = run.options.concurrency,
            "starting run"
        );
        Ok(run.drive().await)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecState {
    /// Form not decided yet
    Undecided,
    Pruned,
    /// Live, waiting on this many prerequisites
    Waiting(usize),
    Runnable,
    Running,
    Succeeded,
    Failed,
    Blocked,
    Skipped,
}

impl ExecState {
    fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::Pruned)
    }

    fn is_broken(self) -> bool {
        matches!(self, Self::Failed | Self::Blocked)
    }
}

enum Message {
    Classified {
        index: usize,
        result: Result<Validity, OracleError>,
    },
    Finished {
        index: usize,
        result: Result<(), String>,
        duration: Duration,
    },
}

/// Owned state of one run
struct Run {
    graph: Arc<TaskGraph>,
    engine: ClosureEngine,
    options: SchedulerOptions,
    oracle: Arc<dyn ValidityOracle>,
    sink: Arc<dyn ExecutionSink>,
    reporter: Arc<dyn TaskReporter>,
    exec: Vec<ExecState>,
    ready: VecDeque<usize>,
    results: HashMap<usize, TaskResult>,
    running: usize,
    queries_in_flight: usize,
    stopping: bool,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Run {
    async fn drive(mut self) -> RunReport {
        let start = Instant::now();

        let decided = self.engine.settle();
        self.apply_decisions(decided);
        self.issue_queries();

        loop {
            while !self.stopping && self.running < self.options.concurrency.max(1) {
                match self.ready.pop_front() {
                    Some(index) => self.dispatch(index),
                    None => break,
                }
            }

            let idle = self.ready.is_empty() && self.queries_in_flight == 0;
            if self.running == 0 && (self.stopping || idle) {
                break;
            }

            match self.rx.recv().await {
                Some(Message::Classified { index, result }) => self.on_classified(index, result),
                Some(Message::Finished {
                    index,
                    result,
                    duration,
                }) => self.on_finished(index, result, duration),
                None => break,
            }
        }

        self.finish(start.elapsed())
    }

    fn form(&self, index: usize) -> Option<Form> {
        self.engine.form(index)
    }

    fn id(&self, index: usize) -> TaskId {
        self.graph.node(index).id.clone()
    }

    /// Move newly decided tasks into the execution state machine
    fn apply_decisions(&mut self, mut decided: Vec<usize>) {
        // Dependencies first, so consumers see their prerequisites' states
        decided.sort_by_key(|&i| self.graph.rank(i));

        for i in decided {
            if self.exec[i] != ExecState::Undecided {
                continue;
            }
            let Some(form) = self.form(i) else {
                continue;
            };

            if form == Form::Pruned {
                self.exec[i] = ExecState::Pruned;
                let reason = self.engine.prune_reason(i).unwrap_or(PruneReason::NotNeeded);
                self.reporter.report(&TaskEvent::Pruned {
                    id: self.id(i),
                    reason,
                });
                self.on_settled(i);
                continue;
            }

            self.reporter.report(&TaskEvent::FormAssigned {
                id: self.id(i),
                form,
            });

            let prerequisites = self.graph.prerequisites(i, form);
            if let Some(&broken) = prerequisites.iter().find(|&&p| self.exec[p].is_broken()) {
                self.block(i, broken);
                self.on_broken(i);
                continue;
            }
            let waiting = prerequisites
                .iter()
                .filter(|&&p| !self.exec[p].is_settled())
                .count();
            self.exec[i] = ExecState::Waiting(waiting);
            if waiting == 0 {
                self.make_runnable(i);
            }
        }
    }

    fn issue_queries(&mut self) {
        if self.stopping {
            return;
        }
        for index in self.engine.take_queries() {
            self.queries_in_flight += 1;
            let id = self.id(index);
            let oracle = Arc::clone(&self.oracle);
            let tx = self.tx.clone();
            debug!(task = %id, "querying cache validity");

            tokio::spawn(async move {
                let query = tokio::spawn(async move { oracle.query(&id).await });
                let result = match query.await {
                    Ok(result) => result,
                    Err(e) => Err(OracleError::Other(format!("validity query panicked: {}", e))),
                };
                let _ = tx.send(Message::Classified { index, result });
            });
        }
    }

    fn on_classified(&mut self, index: usize, result: Result<Validity, OracleError>) {
        self.queries_in_flight = self.queries_in_flight.saturating_sub(1);
        if self.stopping {
            return;
        }

        if let Err(e) = &result {
            self.reporter.report(&TaskEvent::OracleError {
                id: self.id(index),
                error: e.to_string(),
            });
        }
        if let Some(coverage) = self.engine.resolve(index, result.as_ref().copied()) {
            self.reporter.report(&TaskEvent::Classified {
                id: self.id(index),
                coverage,
            });
        }

        let decided = self.engine.settle();
        self.apply_decisions(decided);
        self.issue_queries();
    }

    fn make_runnable(&mut self, index: usize) {
        let Some(form) = self.form(index) else {
            return;
        };
        self.exec[index] = ExecState::Runnable;
        self.ready.push_back(index);
        self.reporter.report(&TaskEvent::Runnable {
            id: self.id(index),
            form,
        });
    }

    fn dispatch(&mut self, index: usize) {
        let Some(form) = self.form(index) else {
            return;
        };
        self.exec[index] = ExecState::Running;
        self.running += 1;

        let node = self.graph.node(index);
        self.reporter.report(&TaskEvent::Started {
            id: node.id.clone(),
            form,
            name: node.executed_name(form),
        });

        let graph = Arc::clone(&self.graph);
        let sink = Arc::clone(&self.sink);
        let reporter = Arc::clone(&self.reporter);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let start = Instant::now();
            let work = tokio::spawn(async move {
                sink.execute(graph.node(index), form, &*reporter)
                    .await
                    .map_err(|e| e.to_string())
            });
            let result = match work.await {
                Ok(result) => result,
                Err(e) => Err(format!("Task panicked: {}", e)),
            };
            let _ = tx.send(Message::Finished {
                index,
                result,
                duration: start.elapsed(),
            });
        });
    }

    fn on_finished(&mut self, index: usize, result: Result<(), String>, duration: Duration) {
        self.running = self.running.saturating_sub(1);
        let form = self.form(index);
        let node = self.graph.node(index);
        let name = form.map_or_else(|| node.id.clone(), |f| node.executed_name(f));
        let id = node.id.clone();

        match result {
            Ok(()) => {
                self.exec[index] = ExecState::Succeeded;
                self.results.insert(
                    index,
                    TaskResult {
                        id: id.clone(),
                        form,
                        status: TaskStatus::Success,
                        duration,
                    },
                );
                self.reporter.report(&TaskEvent::Completed {
                    id,
                    form: form.unwrap_or(Form::Real),
                    name,
                    duration,
                });
                self.on_settled(index);
            }
            Err(error) => {
                self.exec[index] = ExecState::Failed;
                self.results.insert(
                    index,
                    TaskResult {
                        id: id.clone(),
                        form,
                        status: TaskStatus::Failed(error.clone()),
                        duration,
                    },
                );
                self.reporter.report(&TaskEvent::Failed {
                    id,
                    form: form.unwrap_or(Form::Real),
                    name: name.clone(),
                    duration,
                    error,
                });
                if self.options.stop_on_failure && !self.stopping {
                    warn!(task = %name, "stopping after failure");
                    self.stopping = true;
                }
                self.on_broken(index);
            }
        }
    }

    /// A prerequisite settled: count down waiting dependents
    fn on_settled(&mut self, index: usize) {
        let graph = Arc::clone(&self.graph);
        for &dependent in graph.dependents(index) {
            let ExecState::Waiting(remaining) = self.exec[dependent] else {
                continue;
            };
            let Some(form) = self.form(dependent) else {
                continue;
            };
            if !graph.prerequisites(dependent, form).contains(&index) {
                continue;
            }
            let remaining = remaining.saturating_sub(1);
            self.exec[dependent] = ExecState::Waiting(remaining);
            if remaining == 0 {
                self.make_runnable(dependent);
            }
        }
    }

    /// A task failed or was blocked: block every waiting consumer transitively
    fn on_broken(&mut self, index: usize) {
        let graph = Arc::clone(&self.graph);
        let mut pending = vec![index];
        while let Some(broken) = pending.pop() {
            for &dependent in graph.dependents(broken) {
                if !matches!(self.exec[dependent], ExecState::Waiting(_)) {
                    continue;
                }
                let Some(form) = self.form(dependent) else {
                    continue;
                };
                if graph.prerequisites(dependent, form).contains(&broken) {
                    self.block(dependent, broken);
                    pending.push(dependent);
                }
            }
        }
    }

    fn block(&mut self, index: usize, dependency: usize) {
        let id = self.id(index);
        let dependency = self.id(dependency);
        let result = TaskResult {
            id: id.clone(),
            form: self.form(index),
            status: TaskStatus::Blocked(dependency.clone()),
            duration: Duration::ZERO,
        };
        self.exec[index] = ExecState::Blocked;
        self.results.insert(index, result);
        self.reporter.report(&TaskEvent::Blocked { id, dependency });
    }

    fn finish(mut self, duration: Duration) -> RunReport {
        let graph = Arc::clone(&self.graph);
        for &i in graph.sorted() {
            let reason = match self.exec[i] {
                ExecState::Undecided => "form undecided when the run ended",
                ExecState::Waiting(_) | ExecState::Runnable if self.stopping => {
                    "run stopped after a failure"
                }
                ExecState::Waiting(_) | ExecState::Runnable => "never became runnable",
                _ => continue,
            };
            if !self.stopping {
                warn!(task = %graph.node(i).id, reason, "task left unscheduled");
            }
            let id = self.id(i);
            let form = self.form(i);
            let result = TaskResult {
                id: id.clone(),
                form,
                status: TaskStatus::Skipped(reason.to_string()),
                duration: Duration::ZERO,
            };
            self.exec[i] = ExecState::Skipped;
            self.results.insert(i, result);
            self.reporter.report(&TaskEvent::Skipped {
                id,
                form,
                reason: reason.to_string(),
            });
        }

        let results: Vec<TaskResult> = graph
            .sorted()
            .iter()
            .filter_map(|i| self.results.remove(i))
            .collect();

        let mut executed: Vec<String> = results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Success | TaskStatus::Failed(_)))
            .map(|r| r.name(&graph).to_string())
            .collect();
        executed.sort();

        let succeeded = results.iter().filter(|r| r.status.is_success()).count();
        let scene = results
            .iter()
            .filter(|r| r.status.is_success() && r.form == Some(Form::Scene))
            .count();
        let failed = results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Failed(_)))
            .count();
        let blocked = results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Blocked(_)))
            .count();
        let skipped = results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Skipped(_)))
            .count();

        self.reporter.report(&TaskEvent::AllCompleted {
            total: results.len(),
            succeeded,
            failed,
            scene,
            blocked,
            skipped,
            duration,
        });

        RunReport {
            live_set: self.engine.live_set(),
            results,
            executed,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskNode;
    use crate::oracle::StaticOracle;
    use crate::reporter::CollectingReporter;
    use crate::sink::DryRunSink;

    fn id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    fn create_chain() -> Arc<TaskGraph> {
        Arc::new(
            TaskGraph::build(vec![
                TaskNode::new(id("a1:fetch")),
                TaskNode::new(id("a1:compile")).with_dependency(id("a1:fetch")),
                TaskNode::new(id("a1:package"))
                    .coverable()
                    .with_dependency(id("a1:compile")),
                TaskNode::new(id("a1:build")).with_dependency(id("a1:package")),
            ])
            .unwrap(),
        )
    }

    fn scheduler(valid: &[&str], reporter: Arc<CollectingReporter>) -> TaskScheduler {
        TaskScheduler::new(
            SchedulerOptions::default(),
            Arc::new(StaticOracle::new(valid).unwrap()),
            Arc::new(DryRunSink),
            reporter,
        )
    }

    #[test]
    fn test_task_status_is_success() {
        assert!(TaskStatus::Success.is_success());
        assert!(!TaskStatus::Failed("error".to_string()).is_success());
        assert!(!TaskStatus::Blocked(id("a1:fetch")).is_success());
        assert!(!TaskStatus::Skipped("stopped".to_string()).is_success());
    }

    #[test]
    fn test_scheduler_options_default() {
        let opts = SchedulerOptions::default();
        assert!(opts.concurrency > 0);
        assert!(!opts.stop_on_failure);
    }

    #[tokio::test]
    async fn test_run_without_cache() {
        let reporter = Arc::new(CollectingReporter::default());
        let report = scheduler(&[], reporter.clone())
            .run(create_chain(), &[id("a1:build")], EnforcementPolicy::disabled())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.results.len(), 4);
        assert_eq!(
            reporter.started(),
            vec!["a1:fetch", "a1:compile", "a1:package", "a1:build"]
        );
    }

    #[tokio::test]
    async fn test_run_with_covered_task() {
        let reporter = Arc::new(CollectingReporter::default());
        let report = scheduler(&["a1:package"], reporter.clone())
            .run(create_chain(), &[id("a1:build")], EnforcementPolicy::disabled())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.executed().to_vec(),
            vec!["a1:build", "a1:package_setscene"]
        );
        assert_eq!(report.live_set.form(&id("a1:fetch")), Some(Form::Pruned));
        assert_eq!(reporter.started(), vec!["a1:package_setscene", "a1:build"]);
    }

    #[tokio::test]
    async fn test_unknown_requested_task() {
        let reporter = Arc::new(CollectingReporter::default());
        let result = scheduler(&[], reporter)
            .run(create_chain(), &[id("a1:nope")], EnforcementPolicy::disabled())
            .await;
        assert!(matches!(result, Err(GraphError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_open_graph_rejected() {
        let graph = Arc::new(
            TaskGraph::build(vec![TaskNode::new(id("mc:mc1:a1:build"))
                .with_hard_dependency(id("a1:package"))])
            .unwrap(),
        );
        let reporter = Arc::new(CollectingReporter::default());
        let result = scheduler(&[], reporter)
            .run(graph, &[id("mc:mc1:a1:build")], EnforcementPolicy::disabled())
            .await;
        assert!(matches!(result, Err(GraphError::UnresolvedDependency { .. })));
    }
}
