//! Coverage classification of coverable tasks

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::graph::TaskGraph;
use crate::oracle::{OracleError, Validity};
use crate::task::{Coverage, TaskId};

/// Per-task coverage state with memoized oracle queries.
///
/// States start `Unknown` and change at most once. Non-coverable tasks have
/// no state.
#[derive(Debug, Clone)]
pub struct CoverageClassifier {
    states: Vec<Option<Coverage>>,
    queried: Vec<bool>,
}

impl CoverageClassifier {
    pub fn new(graph: &TaskGraph) -> Self {
        let states = graph
            .nodes()
            .iter()
            .map(|n| n.coverable.then_some(Coverage::Unknown))
            .collect();
        Self {
            states,
            queried: vec![false; graph.len()],
        }
    }

    /// Coverage of a task, `None` when it is not coverable
    pub fn state(&self, index: usize) -> Option<Coverage> {
        self.states[index]
    }

    /// Whether an oracle query for the task is still to be issued
    pub fn needs_query(&self, index: usize) -> bool {
        self.states[index] == Some(Coverage::Unknown) && !self.queried[index]
    }

    /// Record that a query was issued; returns false if one already was
    pub fn mark_queried(&mut self, index: usize) -> bool {
        if !self.needs_query(index) {
            return false;
        }
        self.queried[index] = true;
        true
    }

    /// Apply an oracle answer.
    ///
    /// A failed query counts as not covered. Returns the new state when the
    /// task transitioned, `None` if it was already classified or is not
    /// coverable.
    pub fn resolve(
        &mut self,
        graph: &TaskGraph,
        index: usize,
        result: Result<Validity, &OracleError>,
    ) -> Option<Coverage> {
        if self.states[index] != Some(Coverage::Unknown) {
            return None;
        }

        let id = &graph.node(index).id;
        let coverage = match result {
            Ok(Validity::Valid) => Coverage::Covered,
            Ok(Validity::Invalid) => Coverage::NotCovered,
            Err(e) => {
                warn!(task = %id, error = %e, "validity query failed, treating as not covered");
                Coverage::NotCovered
            }
        };
        debug!(task = %id, coverage = %coverage, "task classified");

        self.queried[index] = true;
        self.states[index] = Some(coverage);
        Some(coverage)
    }

    /// Known coverage of every coverable task
    pub fn coverage_map(&self, graph: &TaskGraph) -> BTreeMap<TaskId, Coverage> {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(i, state)| state.map(|s| (graph.node(i).id.clone(), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskNode;

    fn create_graph() -> TaskGraph {
        TaskGraph::build(vec![
            TaskNode::new(TaskId::new("a1", "compile")),
            TaskNode::new(TaskId::new("a1", "package"))
                .coverable()
                .with_dependency(TaskId::new("a1", "compile")),
        ])
        .unwrap()
    }

    #[test]
    fn test_initial_states() {
        let graph = create_graph();
        let classifier = CoverageClassifier::new(&graph);
        assert_eq!(classifier.state(0), None);
        assert_eq!(classifier.state(1), Some(Coverage::Unknown));
        assert!(!classifier.needs_query(0));
        assert!(classifier.needs_query(1));
    }

    #[test]
    fn test_query_issued_once() {
        let graph = create_graph();
        let mut classifier = CoverageClassifier::new(&graph);
        assert!(classifier.mark_queried(1));
        assert!(!classifier.mark_queried(1));
        assert!(!classifier.needs_query(1));
        assert_eq!(classifier.state(1), Some(Coverage::Unknown));
    }

    #[test]
    fn test_resolve_is_monotonic() {
        let graph = create_graph();
        let mut classifier = CoverageClassifier::new(&graph);
        classifier.mark_queried(1);

        assert_eq!(
            classifier.resolve(&graph, 1, Ok(Validity::Valid)),
            Some(Coverage::Covered)
        );
        assert_eq!(classifier.resolve(&graph, 1, Ok(Validity::Invalid)), None);
        assert_eq!(classifier.state(1), Some(Coverage::Covered));
        assert!(!classifier.needs_query(1));
    }

    #[test]
    fn test_oracle_error_is_not_covered() {
        let graph = create_graph();
        let mut classifier = CoverageClassifier::new(&graph);
        let err = OracleError::Other("timeout".to_string());
        assert_eq!(
            classifier.resolve(&graph, 1, Err(&err)),
            Some(Coverage::NotCovered)
        );
    }

    #[test]
    fn test_non_coverable_ignored() {
        let graph = create_graph();
        let mut classifier = CoverageClassifier::new(&graph);
        assert_eq!(classifier.resolve(&graph, 0, Ok(Validity::Valid)), None);

        let map = classifier.coverage_map(&graph);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&TaskId::new("a1", "package")], Coverage::Unknown);
    }
}
