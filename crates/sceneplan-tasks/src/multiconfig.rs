//! Composition of independently namespaced graphs into one run

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::graph::{GraphError, TaskGraph};
use crate::oracle::{RoutingOracle, ValidityOracle};
use crate::task::TaskId;

/// A composed multi-namespace run
pub struct Composition {
    /// Merged graph with every cross-namespace edge resolved
    pub graph: Arc<TaskGraph>,
    /// Oracle routing each query to its namespace's oracle
    pub oracle: Arc<RoutingOracle>,
    /// Requested tasks across all namespaces
    pub requested: Vec<TaskId>,
}

/// Collects per-namespace graphs, oracles and requests
#[derive(Default)]
pub struct NamespaceComposer {
    graphs: Vec<TaskGraph>,
    oracle: RoutingOracle,
    namespaces: BTreeSet<String>,
    requested: Vec<TaskId>,
}

impl NamespaceComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace graph and the oracle that answers for it
    pub fn add_namespace(
        &mut self,
        namespace: &str,
        graph: TaskGraph,
        oracle: Arc<dyn ValidityOracle>,
    ) -> Result<(), GraphError> {
        if !self.namespaces.insert(namespace.to_string()) {
            return Err(GraphError::DuplicateNamespace(namespace.to_string()));
        }
        if let Some(stray) = graph.nodes().iter().find(|n| n.id.namespace != namespace) {
            return Err(GraphError::MalformedNode {
                task: stray.id.to_string(),
                reason: format!("supplied as part of namespace '{}'", namespace),
            });
        }

        debug!(namespace, tasks = graph.len(), "namespace added");
        self.oracle.route(namespace, oracle);
        self.graphs.push(graph);
        Ok(())
    }

    /// Request a task in any namespace
    pub fn request(&mut self, id: TaskId) {
        if !self.requested.contains(&id) {
            self.requested.push(id);
        }
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    /// Merge all namespaces; cross-namespace edges must resolve
    pub fn compose(self) -> Result<Composition, GraphError> {
        let graph = TaskGraph::merge(self.graphs)?;
        for id in &self.requested {
            if graph.get(id).is_none() {
                return Err(GraphError::TaskNotFound(id.to_string()));
            }
        }

        info!(
            namespaces = self.namespaces.len(),
            tasks = graph.len(),
            requested = self.requested.len(),
            "namespaces composed"
        );
        Ok(Composition {
            graph: Arc::new(graph),
            oracle: Arc::new(self.oracle),
            requested: self.requested,
        })
    }
}
