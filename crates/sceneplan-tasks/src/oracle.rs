//! Cache validity oracles

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::policy::{PatternError, TaskMatcher};
use crate::task::TaskId;

/// Answer of a validity query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// A valid cached artifact exists for the task
    Valid,
    /// No usable cached artifact
    Invalid,
}

/// Errors raised while querying an oracle
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("No oracle registered for namespace '{0}'")]
    UnknownNamespace(String),

    #[error("Failed to read artifact stamp for {id}: {message}")]
    Stamp { id: String, message: String },

    #[error("Oracle query failed: {0}")]
    Other(String),
}

/// Answers whether a coverable task has a valid cached artifact.
///
/// Queries may take arbitrarily long; the caller guarantees each task is
/// queried at most once per run.
#[async_trait]
pub trait ValidityOracle: Send + Sync {
    async fn query(&self, id: &TaskId) -> Result<Validity, OracleError>;
}

/// Oracle backed by a fixed list of valid tasks
#[derive(Debug, Default)]
pub struct StaticOracle {
    valid: TaskMatcher,
    queries: AtomicUsize,
}

impl StaticOracle {
    /// Oracle for which every task is invalid
    pub fn empty() -> Self {
        Self::default()
    }

    /// Oracle reporting the given ids or patterns as valid
    pub fn new<I, S>(valid: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            valid: TaskMatcher::new(valid)?,
            queries: AtomicUsize::new(0),
        })
    }

    /// Number of queries answered so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValidityOracle for StaticOracle {
    async fn query(&self, id: &TaskId) -> Result<Validity, OracleError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.valid.matches(id) {
            Ok(Validity::Valid)
        } else {
            Ok(Validity::Invalid)
        }
    }
}

/// Routes each query to the oracle of the task's namespace
#[derive(Default, Clone)]
pub struct RoutingOracle {
    routes: HashMap<String, Arc<dyn ValidityOracle>>,
}

impl RoutingOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the oracle for a namespace, replacing any previous one
    pub fn route(&mut self, namespace: impl Into<String>, oracle: Arc<dyn ValidityOracle>) {
        self.routes.insert(namespace.into(), oracle);
    }

    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ValidityOracle for RoutingOracle {
    async fn query(&self, id: &TaskId) -> Result<Validity, OracleError> {
        match self.routes.get(&id.namespace) {
            Some(oracle) => oracle.query(id).await,
            None => Err(OracleError::UnknownNamespace(id.namespace.clone())),
        }
    }
}

/// Valid when any of its oracles reports the task valid
#[derive(Default, Clone)]
pub struct AnyOracle {
    oracles: Vec<Arc<dyn ValidityOracle>>,
}

impl AnyOracle {
    pub fn push(&mut self, oracle: Arc<dyn ValidityOracle>) {
        self.oracles.push(oracle);
    }
}

#[async_trait]
impl ValidityOracle for AnyOracle {
    async fn query(&self, id: &TaskId) -> Result<Validity, OracleError> {
        let mut first_error = None;
        for oracle in &self.oracles {
            match oracle.query(id).await {
                Ok(Validity::Valid) => return Ok(Validity::Valid),
                Ok(Validity::Invalid) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(Validity::Invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_oracle() {
        let oracle = StaticOracle::new(["a1:package", "*:populate_sysroot"]).unwrap();
        assert_eq!(
            oracle.query(&TaskId::new("a1", "package")).await.unwrap(),
            Validity::Valid
        );
        assert_eq!(
            oracle
                .query(&TaskId::new("b1", "populate_sysroot"))
                .await
                .unwrap(),
            Validity::Valid
        );
        assert_eq!(
            oracle.query(&TaskId::new("b1", "package")).await.unwrap(),
            Validity::Invalid
        );
        assert_eq!(oracle.query_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_oracle() {
        let oracle = StaticOracle::empty();
        assert_eq!(
            oracle.query(&TaskId::new("a1", "package")).await.unwrap(),
            Validity::Invalid
        );
    }

    #[tokio::test]
    async fn test_routing_oracle() {
        let mut routing = RoutingOracle::new();
        routing.route("", Arc::new(StaticOracle::new(["a1:package"]).unwrap()));
        routing.route("mc1", Arc::new(StaticOracle::empty()));

        assert_eq!(
            routing.query(&TaskId::new("a1", "package")).await.unwrap(),
            Validity::Valid
        );
        assert_eq!(
            routing
                .query(&TaskId::in_namespace("mc1", "a1", "package"))
                .await
                .unwrap(),
            Validity::Invalid
        );
        assert!(matches!(
            routing
                .query(&TaskId::in_namespace("mc2", "a1", "package"))
                .await,
            Err(OracleError::UnknownNamespace(_))
        ));
        assert_eq!(routing.namespaces(), vec!["", "mc1"]);
    }

    #[tokio::test]
    async fn test_any_oracle() {
        let mut any = AnyOracle::default();
        any.push(Arc::new(StaticOracle::new(["a1:package"]).unwrap()));
        any.push(Arc::new(StaticOracle::new(["b1:*"]).unwrap()));
        assert_eq!(
            any.query(&TaskId::new("b1", "package")).await.unwrap(),
            Validity::Valid
        );
        assert_eq!(
            any.query(&TaskId::new("c1", "package")).await.unwrap(),
            Validity::Invalid
        );
        assert_eq!(
            AnyOracle::default()
                .query(&TaskId::new("a1", "package"))
                .await
                .unwrap(),
            Validity::Invalid
        );
    }
}
