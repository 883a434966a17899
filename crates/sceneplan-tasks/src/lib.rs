//! Sceneplan Tasks - cache-aware task closure planning and scheduling
//!
//! This crate computes which tasks of a build graph must run, which can be
//! restored from cached artifacts, and which can be skipped, then executes
//! the live set with bounded parallelism.

pub mod cache;
pub mod closure;
pub mod coverage;
pub mod graph;
pub mod multiconfig;
pub mod oracle;
pub mod plan;
pub mod policy;
pub mod reporter;
pub mod scheduler;
pub mod sink;
pub mod target;
pub mod task;

pub use cache::{ArtifactStore, CacheError, CacheStats, PruneStats, Signature};
pub use closure::{ClosureEngine, LiveSet, Outlook, PruneReason};
pub use coverage::CoverageClassifier;
pub use graph::{Dependency, GraphError, TaskGraph, TaskNode};
pub use multiconfig::{Composition, NamespaceComposer};
pub use oracle::{AnyOracle, OracleError, RoutingOracle, StaticOracle, Validity, ValidityOracle};
pub use plan::{plan, Plan, PlanEntry};
pub use policy::{EnforcementPolicy, PatternError, TaskMatcher};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{RunReport, SchedulerOptions, TaskResult, TaskScheduler, TaskStatus};
pub use sink::{DryRunSink, ExecutionError, ExecutionSink, ShellSink};
pub use target::{resolve_targets, Target, TargetError};
pub use task::{Coverage, EdgeKind, Form, TaskDefinition, TaskId};
