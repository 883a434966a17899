//! Resolution of command-line targets to task ids

use crate::graph::TaskGraph;
use crate::task::{normalize_task_name, TaskId, NAMESPACE_PREFIX};

/// Errors resolving targets
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Invalid target '{0}': expected recipe, recipe:task, or mc:<namespace>:recipe[:task]")]
    Invalid(String),

    #[error("Unknown recipe '{recipe}' in namespace '{namespace}'")]
    UnknownRecipe { namespace: String, recipe: String },

    #[error("Recipe '{recipe}' has no task '{task}'")]
    UnknownTask { recipe: String, task: String },
}

/// A parsed target before validation against a graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    pub recipe: String,
    /// Explicit task, if the target named one
    pub task: Option<String>,
}

impl Target {
    /// Parse `recipe`, `recipe:task`, `mc:<ns>:recipe` or `mc:<ns>:recipe:task`
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (namespace, recipe, task) = match parts.as_slice() {
            [prefix, ns, recipe] if *prefix == NAMESPACE_PREFIX => (*ns, *recipe, None),
            [prefix, ns, recipe, task] if *prefix == NAMESPACE_PREFIX => (*ns, *recipe, Some(*task)),
            [recipe] => ("", *recipe, None),
            [recipe, task] => ("", *recipe, Some(*task)),
            _ => return Err(TargetError::Invalid(s.to_string())),
        };

        let task = task.map(normalize_task_name);
        if recipe.is_empty() || task.is_some_and(str::is_empty) {
            return Err(TargetError::Invalid(s.to_string()));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            recipe: recipe.to_string(),
            task: task.map(str::to_string),
        })
    }

    /// Task id, using `default_task` for a bare recipe
    pub fn task_id(&self, default_task: &str) -> TaskId {
        let task = self
            .task
            .as_deref()
            .unwrap_or_else(|| normalize_task_name(default_task));
        TaskId::in_namespace(self.namespace.clone(), self.recipe.clone(), task)
    }
}

/// Resolve targets against a graph, in order and without duplicates
pub fn resolve_targets<S: AsRef<str>>(
    graph: &TaskGraph,
    targets: &[S],
    default_task: &str,
) -> Result<Vec<TaskId>, TargetError> {
    let mut resolved = Vec::new();
    for raw in targets {
        let target = Target::parse(raw.as_ref())?;
        if !graph.has_recipe(&target.namespace, &target.recipe) {
            return Err(TargetError::UnknownRecipe {
                namespace: target.namespace,
                recipe: target.recipe,
            });
        }

        let id = target.task_id(default_task);
        if graph.get(&id).is_none() {
            return Err(TargetError::UnknownTask {
                recipe: target.recipe,
                task: id.task_name,
            });
        }
        if !resolved.contains(&id) {
            resolved.push(id);
        }
    }
    Ok(resolved)
}
