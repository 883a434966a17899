//! Planning a run without executing it

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::closure::{ClosureEngine, LiveSet, PruneReason};
use crate::graph::{GraphError, TaskGraph};
use crate::oracle::{OracleError, ValidityOracle};
use crate::policy::EnforcementPolicy;
use crate::task::{Coverage, Form, TaskId};

/// Settled live set of a run, with the coverage that produced it
#[derive(Debug, Clone)]
pub struct Plan {
    /// Final forms
    pub live_set: LiveSet,
    /// Coverage of every coverable task (Unknown when never queried)
    pub coverage: BTreeMap<TaskId, Coverage>,
    /// Requested tasks
    pub requested: Vec<TaskId>,
    /// Number of oracle queries issued
    pub queries: usize,
    reasons: BTreeMap<TaskId, PruneReason>,
}

/// One line of a plan, for display and serialization
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub task: String,
    pub form: Form,
    /// Name executed under, for live tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executes_as: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<PruneReason>,
}

impl Plan {
    /// Why a task was pruned
    pub fn prune_reason(&self, id: &TaskId) -> Option<PruneReason> {
        self.reasons.get(id).copied()
    }

    /// Entries in task id order
    pub fn entries(&self, graph: &TaskGraph) -> Vec<PlanEntry> {
        self.live_set
            .iter()
            .map(|(id, form)| PlanEntry {
                task: id.to_string(),
                form,
                executes_as: form
                    .is_live()
                    .then(|| graph.get(id).map(|n| n.executed_name(form).to_string()))
                    .flatten(),
                coverage: self.coverage.get(id).copied(),
                reason: self.prune_reason(id),
            })
            .collect()
    }
}

/// Resolve every oracle query the requested tasks need and settle the live set.
///
/// Queries of one round run concurrently; answers can only narrow the
/// outlook of the tasks below them, so each round asks strictly fewer new
/// questions until none remain.
#[instrument(skip_all, fields(tasks = graph.len(), requested = requested.len()))]
pub async fn plan(
    graph: Arc<TaskGraph>,
    oracle: Arc<dyn ValidityOracle>,
    requested: &[TaskId],
    policy: EnforcementPolicy,
) -> Result<Plan, GraphError> {
    graph.ensure_closed()?;

    let mut engine = ClosureEngine::new(Arc::clone(&graph), policy);
    for id in requested {
        engine.request(id)?;
    }

    let mut queries = 0usize;
    loop {
        engine.settle();
        let round = engine.take_queries();
        if round.is_empty() {
            break;
        }
        queries += round.len();

        let handles: Vec<_> = round
            .into_iter()
            .map(|index| {
                let oracle = Arc::clone(&oracle);
                let id = graph.node(index).id.clone();
                (index, tokio::spawn(async move { oracle.query(&id).await }))
            })
            .collect();

        for (index, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(OracleError::Other(format!("validity query panicked: {}", e))),
            };
            engine.resolve(index, result.as_ref().copied());
        }
    }

    let live_set = engine.live_set();
    let reasons = (0..graph.len())
        .filter_map(|i| engine.prune_reason(i).map(|r| (graph.node(i).id.clone(), r)))
        .collect();

    info!(
        live = live_set.live_count(),
        pruned = live_set.with_form(Form::Pruned).len(),
        queries,
        "plan settled"
    );

    Ok(Plan {
        live_set,
        coverage: engine.classifier().coverage_map(&graph),
        requested: engine.requested(),
        queries,
        reasons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskNode;
    use crate::oracle::{RoutingOracle, StaticOracle};

    fn id(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    fn create_graph() -> Arc<TaskGraph> {
        Arc::new(
            TaskGraph::build(vec![
                TaskNode::new(id("a1:compile")),
                TaskNode::new(id("a1:package"))
                    .coverable()
                    .with_dependency(id("a1:compile")),
                TaskNode::new(id("a1:sysroot"))
                    .coverable()
                    .with_dependency(id("a1:compile")),
                TaskNode::new(id("a1:build"))
                    .with_dependency(id("a1:package"))
                    .with_dependency(id("a1:sysroot")),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_plan_settles_live_set() {
        let graph = create_graph();
        let oracle = Arc::new(StaticOracle::new(["a1:package"]).unwrap());
        let plan = plan(
            Arc::clone(&graph),
            oracle.clone(),
            &[id("a1:build")],
            EnforcementPolicy::disabled(),
        )
        .await
        .unwrap();

        assert!(plan.live_set.is_complete());
        assert_eq!(
            plan.live_set.executed(),
            vec!["a1:build", "a1:compile", "a1:package_setscene", "a1:sysroot"]
        );
        assert_eq!(plan.coverage[&id("a1:package")], Coverage::Covered);
        assert_eq!(plan.coverage[&id("a1:sysroot")], Coverage::NotCovered);
        assert_eq!(plan.queries, 2);
        assert_eq!(oracle.query_count(), 2);
        assert_eq!(plan.requested, vec![id("a1:build")]);
    }

    #[tokio::test]
    async fn test_plan_failed_queries_run_real() {
        let graph = create_graph();
        // No namespaces routed, so every query fails
        let plan = plan(
            Arc::clone(&graph),
            Arc::new(RoutingOracle::new()),
            &[id("a1:build")],
            EnforcementPolicy::disabled(),
        )
        .await
        .unwrap();

        assert_eq!(plan.queries, 2);
        assert_eq!(plan.coverage[&id("a1:package")], Coverage::NotCovered);
        assert_eq!(plan.coverage[&id("a1:sysroot")], Coverage::NotCovered);
        assert_eq!(
            plan.live_set.executed(),
            vec!["a1:build", "a1:compile", "a1:package", "a1:sysroot"]
        );
    }

    #[tokio::test]
    async fn test_plan_entries() {
        let graph = create_graph();
        let oracle = Arc::new(StaticOracle::new(["a1:*"]).unwrap());
        let plan = plan(
            Arc::clone(&graph),
            oracle,
            &[id("a1:build")],
            EnforcementPolicy::disabled(),
        )
        .await
        .unwrap();

        let entries = plan.entries(&graph);
        assert_eq!(entries.len(), 4);

        let compile = entries.iter().find(|e| e.task == "a1:compile").unwrap();
        assert_eq!(compile.form, Form::Pruned);
        assert_eq!(compile.reason, Some(PruneReason::NotNeeded));
        assert!(compile.executes_as.is_none());

        let package = entries.iter().find(|e| e.task == "a1:package").unwrap();
        assert_eq!(package.executes_as.as_deref(), Some("a1:package_setscene"));

        let json = serde_json::to_string(&entries).unwrap();
        assert!(json.contains("\"form\":\"scene\""));
    }
}
