//! Task identity and per-task vocabulary

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix marking a multiconfig namespace in textual task ids
pub const NAMESPACE_PREFIX: &str = "mc";

/// Suffix appended to a task name to name its cache-satisfied variant
pub const SCENE_SUFFIX: &str = "_setscene";

/// Unique identifier for a task across all namespaces
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Multiconfig namespace ("" is the default namespace)
    pub namespace: String,
    /// Recipe the task belongs to
    pub recipe: String,
    /// Task name (e.g., "fetch", "compile", "package")
    pub task_name: String,
}

impl TaskId {
    /// Create a task ID in the default namespace
    pub fn new(recipe: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self::in_namespace("", recipe, task_name)
    }

    /// Create a task ID in a specific namespace
    pub fn in_namespace(
        namespace: impl Into<String>,
        recipe: impl Into<String>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            recipe: recipe.into(),
            task_name: task_name.into(),
        }
    }

    /// Parse a task ID from "recipe:task" or "mc:namespace:recipe:task".
    ///
    /// A leading `do_` on the task name is stripped.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let (namespace, recipe, task) = match parts.as_slice() {
            [recipe, task] => ("", *recipe, *task),
            [prefix, ns, recipe, task] if *prefix == NAMESPACE_PREFIX => (*ns, *recipe, *task),
            _ => return None,
        };
        let task = normalize_task_name(task);
        if recipe.is_empty() || task.is_empty() {
            return None;
        }
        Some(Self::in_namespace(namespace, recipe, task))
    }

    /// Whether this task lives in the default namespace
    pub fn is_default_namespace(&self) -> bool {
        self.namespace.is_empty()
    }

    /// The same recipe/task in another namespace
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self::in_namespace(namespace, self.recipe.clone(), self.task_name.clone())
    }

    /// Another task of the same recipe
    pub fn sibling(&self, task_name: impl Into<String>) -> Self {
        Self::in_namespace(self.namespace.clone(), self.recipe.clone(), task_name)
    }

    /// Default id of this task's cache-satisfied variant
    pub fn scene_variant(&self) -> Self {
        self.sibling(format!("{}{}", self.task_name, SCENE_SUFFIX))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default_namespace() {
            write!(f, "{}:{}", self.recipe, self.task_name)
        } else {
            write!(
                f,
                "{}:{}:{}:{}",
                NAMESPACE_PREFIX, self.namespace, self.recipe, self.task_name
            )
        }
    }
}

/// Strip the conventional `do_` prefix from a task name
pub fn normalize_task_name(name: &str) -> &str {
    name.strip_prefix("do_").unwrap_or(name)
}

/// The form a task takes in a run
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Form {
    /// Cache-satisfied substitute of a coverable task
    Scene,
    /// Full execution of the task's work
    Real,
    /// Not executed in this run
    Pruned,
}

impl Form {
    /// Whether the task executes in this form
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Pruned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Real => "real",
            Self::Pruned => "pruned",
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache coverage of a coverable task
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// Oracle has not answered yet
    Unknown,
    /// A valid cached artifact exists
    Covered,
    /// No valid cached artifact
    NotCovered,
}

impl Coverage {
    /// Whether the oracle has answered
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Covered => "covered",
            Self::NotCovered => "not covered",
        })
    }
}

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Satisfied by the upstream task's Scene or Real form
    #[default]
    Normal,
    /// Forces the upstream task's Real form whenever the consumer is live
    Hard,
}

/// Work attached to a task; interpreted by execution sinks only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Command executed for the Real form
    #[serde(default)]
    pub command: Option<String>,

    /// Command executed for the Scene form
    #[serde(default)]
    pub scene_command: Option<String>,

    /// Environment variables to pass
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl TaskDefinition {
    /// Create an empty task definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Real form command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set the Scene form command
    pub fn with_scene_command(mut self, command: impl Into<String>) -> Self {
        self.scene_command = Some(command.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command to run for the given form, if any
    pub fn command_for(&self, form: Form) -> Option<&str> {
        match form {
            Form::Real => self.command.as_deref(),
            Form::Scene => self.scene_command.as_deref(),
            Form::Pruned => None,
        }
    }
}
