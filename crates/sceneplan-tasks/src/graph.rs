//! Task graph construction and management

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use sceneplan_core::config::{Config, RecipeConfig};

use crate::task::{EdgeKind, Form, TaskDefinition, TaskId};

/// A dependency edge declared by a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// Upstream task
    pub id: TaskId,
    /// Edge kind
    pub kind: EdgeKind,
}

/// A node in the task graph, as supplied by a graph provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Task identifier
    pub id: TaskId,
    /// Work attached to the task
    pub definition: TaskDefinition,
    /// Tasks the Real form consumes
    pub dependencies: Vec<Dependency>,
    /// Tasks the Scene form consumes
    pub scene_dependencies: Vec<TaskId>,
    /// Whether the task has a cache-satisfiable variant
    pub coverable: bool,
    /// Id of the cache-satisfiable variant
    pub scene_variant: Option<TaskId>,
}

impl TaskNode {
    /// Create a non-coverable node without dependencies
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            definition: TaskDefinition::default(),
            dependencies: Vec::new(),
            scene_dependencies: Vec::new(),
            coverable: false,
            scene_variant: None,
        }
    }

    /// Mark the node coverable, using the default variant id
    pub fn coverable(mut self) -> Self {
        self.scene_variant = Some(self.id.scene_variant());
        self.coverable = true;
        self
    }

    /// Add an ordinary dependency
    pub fn with_dependency(mut self, id: TaskId) -> Self {
        self.dependencies.push(Dependency {
            id,
            kind: EdgeKind::Normal,
        });
        self
    }

    /// Add a hard dependency
    pub fn with_hard_dependency(mut self, id: TaskId) -> Self {
        self.dependencies.push(Dependency {
            id,
            kind: EdgeKind::Hard,
        });
        self
    }

    /// Add a dependency of the Scene form
    pub fn with_scene_dependency(mut self, id: TaskId) -> Self {
        self.scene_dependencies.push(id);
        self
    }

    /// Attach a task definition
    pub fn with_definition(mut self, definition: TaskDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// Name of the task as executed in the given form
    pub fn executed_name(&self, form: Form) -> TaskId {
        match (form, &self.scene_variant) {
            (Form::Scene, Some(variant)) => variant.clone(),
            _ => self.id.clone(),
        }
    }
}

/// Immutable directed acyclic graph of tasks.
///
/// Nodes are addressed internally by index; the index of a node is its
/// position in [`TaskGraph::nodes`].
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
    /// Resolved ordinary and hard dependencies
    edges: Vec<Vec<(usize, EdgeKind)>>,
    /// Resolved scene dependencies
    scene_edges: Vec<Vec<usize>>,
    /// Reverse adjacency over both edge sets, deduplicated
    dependents: Vec<Vec<usize>>,
    /// Dependencies on tasks of other namespaces not present in this graph
    external: Vec<(TaskId, TaskId)>,
    /// Topological order (dependencies first)
    sorted_order: Vec<usize>,
    /// Position of each node in `sorted_order`
    rank: Vec<usize>,
    /// Tasks grouped by depth
    waves: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build a graph from provider nodes.
    ///
    /// Dependencies on tasks of another namespace that are absent from
    /// `nodes` are kept as external references, to be resolved when
    /// namespaces are composed. Any other dangling reference, duplicate id,
    /// malformed node or cycle is rejected.
    #[instrument(skip_all, fields(node_count = nodes.len()))]
    pub fn build(nodes: Vec<TaskNode>) -> Result<Self, GraphError> {
        let mut nodes = nodes;
        let mut index: HashMap<TaskId, usize> = HashMap::with_capacity(nodes.len());

        for (i, node) in nodes.iter_mut().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask(node.id.to_string()));
            }

            if node.coverable && node.scene_variant.is_none() {
                node.scene_variant = Some(node.id.scene_variant());
            }
            if !node.coverable {
                if node.scene_variant.is_some() {
                    return Err(GraphError::MalformedNode {
                        task: node.id.to_string(),
                        reason: "scene variant declared on a non-coverable task".to_string(),
                    });
                }
                if !node.scene_dependencies.is_empty() {
                    return Err(GraphError::MalformedNode {
                        task: node.id.to_string(),
                        reason: "scene dependencies declared on a non-coverable task".to_string(),
                    });
                }
            }
        }

        let mut edges: Vec<Vec<(usize, EdgeKind)>> = vec![Vec::new(); nodes.len()];
        let mut scene_edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut external = Vec::new();

        for (i, node) in nodes.iter().enumerate() {
            let mut resolved: HashMap<usize, EdgeKind> = HashMap::new();
            for dep in &node.dependencies {
                match index.get(&dep.id) {
                    Some(&d) => {
                        // A hard declaration wins over an ordinary one
                        let kind = resolved.entry(d).or_insert(dep.kind);
                        if dep.kind == EdgeKind::Hard {
                            *kind = EdgeKind::Hard;
                        }
                    }
                    None if dep.id.namespace != node.id.namespace => {
                        external.push((node.id.clone(), dep.id.clone()));
                    }
                    None => {
                        return Err(GraphError::MissingDependency {
                            task: node.id.to_string(),
                            dependency: dep.id.to_string(),
                        })
                    }
                }
            }
            let mut resolved: Vec<(usize, EdgeKind)> = resolved.into_iter().collect();
            resolved.sort_unstable_by_key(|(d, _)| *d);
            edges[i] = resolved;

            let mut scene: BTreeSet<usize> = BTreeSet::new();
            for dep in &node.scene_dependencies {
                match index.get(dep) {
                    Some(&d) => {
                        scene.insert(d);
                    }
                    None if dep.namespace != node.id.namespace => {
                        external.push((node.id.clone(), dep.clone()));
                    }
                    None => {
                        return Err(GraphError::MissingDependency {
                            task: node.id.to_string(),
                            dependency: dep.to_string(),
                        })
                    }
                }
            }
            scene_edges[i] = scene.into_iter().collect();
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for i in 0..nodes.len() {
            let upstream: BTreeSet<usize> = edges[i]
                .iter()
                .map(|(d, _)| *d)
                .chain(scene_edges[i].iter().copied())
                .collect();
            for d in upstream {
                dependents[d].push(i);
            }
        }

        let sorted_order = Self::topological_sort(&nodes, &edges, &scene_edges, &dependents)?;

        let mut rank = vec![0; nodes.len()];
        for (pos, &i) in sorted_order.iter().enumerate() {
            rank[i] = pos;
        }

        let waves = Self::compute_waves(&edges, &scene_edges, &sorted_order);

        debug!(
            task_count = nodes.len(),
            wave_count = waves.len(),
            external = external.len(),
            "task graph built"
        );

        Ok(Self {
            nodes,
            index,
            edges,
            scene_edges,
            dependents,
            external,
            sorted_order,
            rank,
            waves,
        })
    }

    /// Build one namespace's graph from the pipeline configuration.
    ///
    /// Each recipe instantiated in `namespace` gets one node per pipeline
    /// task it carries. For example, if "configure" depends_on "patch" and
    /// "prepare_recipe_sysroot" has recipe_depends_on = ["populate_sysroot"],
    /// then for recipe b1 depending on a1:
    ///   b1:configure -> b1:patch
    ///   b1:prepare_recipe_sysroot -> a1:populate_sysroot
    #[instrument(skip(config), fields(recipes = config.recipes.len(), pipeline = config.pipeline.len()))]
    pub fn from_config(namespace: &str, config: &Config) -> Result<Self, GraphError> {
        let recipes: Vec<&RecipeConfig> = config
            .recipes
            .iter()
            .filter(|r| r.instantiated_in(namespace))
            .collect();
        let by_name: HashMap<&str, &RecipeConfig> =
            recipes.iter().map(|r| (r.name.as_str(), *r)).collect();

        let task_names = |recipe: &RecipeConfig| -> Vec<String> {
            if recipe.tasks.is_empty() {
                let mut all: Vec<String> = config.pipeline.keys().cloned().collect();
                all.sort();
                all
            } else {
                recipe.tasks.clone()
            }
        };
        let carried: HashMap<&str, HashSet<String>> = recipes
            .iter()
            .map(|r| (r.name.as_str(), task_names(r).into_iter().collect()))
            .collect();

        let mut nodes = Vec::new();
        for recipe in &recipes {
            for dep in &recipe.depends {
                if !by_name.contains_key(dep.as_str()) {
                    return Err(GraphError::RecipeNotFound(format!(
                        "{} (required by {})",
                        dep, recipe.name
                    )));
                }
            }

            for task_name in task_names(recipe) {
                let class = config
                    .pipeline
                    .get(&task_name)
                    .ok_or_else(|| GraphError::TaskNotFound(task_name.clone()))?;

                let id = TaskId::in_namespace(namespace, &recipe.name, &task_name);
                let mut node = TaskNode::new(id.clone()).with_definition(TaskDefinition {
                    command: class.command.clone(),
                    scene_command: class.scene_command.clone(),
                    env: class.env.clone(),
                });
                if class.coverable {
                    node = node.coverable();
                }

                // Same-recipe task dependencies (e.g., configure depends_on patch)
                for dep_task in &class.depends_on {
                    node = node.with_dependency(id.sibling(dep_task));
                }

                if class.coverable {
                    for dep_task in &class.scene_depends_on {
                        node = node.with_scene_dependency(id.sibling(dep_task));
                    }
                }

                // Cross-recipe dependencies, only where the upstream recipe carries the task
                for dep_recipe in &recipe.depends {
                    let upstream = &carried[dep_recipe.as_str()];
                    for dep_task in &class.recipe_depends_on {
                        if upstream.contains(dep_task) {
                            node = node.with_dependency(TaskId::in_namespace(
                                namespace, dep_recipe, dep_task,
                            ));
                        }
                    }
                    for dep_task in &class.hard_recipe_depends_on {
                        if upstream.contains(dep_task) {
                            node = node.with_hard_dependency(TaskId::in_namespace(
                                namespace, dep_recipe, dep_task,
                            ));
                        }
                    }
                    if class.coverable {
                        for dep_task in &class.recipe_scene_depends_on {
                            if upstream.contains(dep_task) {
                                node = node.with_scene_dependency(TaskId::in_namespace(
                                    namespace, dep_recipe, dep_task,
                                ));
                            }
                        }
                    }
                }

                for extra in recipe.extra_depends.iter().filter(|e| e.task == task_name) {
                    let target = TaskId::parse(&extra.on)
                        .ok_or_else(|| GraphError::InvalidTaskId(extra.on.clone()))?;
                    node = if extra.hard {
                        node.with_hard_dependency(target)
                    } else {
                        node.with_dependency(target)
                    };
                }

                nodes.push(node);
            }
        }

        let graph = Self::build(nodes)?;
        info!(
            namespace,
            task_count = graph.len(),
            "namespace task graph built"
        );
        Ok(graph)
    }

    /// Merge several graphs (typically one per namespace) into one closed graph
    pub fn merge(graphs: Vec<TaskGraph>) -> Result<Self, GraphError> {
        let nodes: Vec<TaskNode> = graphs.into_iter().flat_map(|g| g.nodes).collect();
        let graph = Self::build(nodes)?;
        graph.ensure_closed()?;
        Ok(graph)
    }

    /// Topological sort using Kahn's algorithm
    fn topological_sort(
        nodes: &[TaskNode],
        edges: &[Vec<(usize, EdgeKind)>],
        scene_edges: &[Vec<usize>],
        dependents: &[Vec<usize>],
    ) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = (0..nodes.len())
            .map(|i| {
                edges[i]
                    .iter()
                    .map(|(d, _)| *d)
                    .chain(scene_edges[i].iter().copied())
                    .collect::<BTreeSet<_>>()
                    .len()
            })
            .collect();
        let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(nodes.len());

        while let Some(i) = queue.pop_front() {
            sorted.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] = in_degree[dependent].saturating_sub(1);
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if sorted.len() != nodes.len() {
            let in_sorted: HashSet<usize> = sorted.iter().copied().collect();
            let mut cyclic: Vec<String> = (0..nodes.len())
                .filter(|i| !in_sorted.contains(i))
                .map(|i| nodes[i].id.to_string())
                .collect();
            cyclic.sort();
            return Err(GraphError::CyclicDependency(cyclic.join(", ")));
        }

        Ok(sorted)
    }

    /// Group tasks by depth (tasks in the same wave never depend on each other)
    fn compute_waves(
        edges: &[Vec<(usize, EdgeKind)>],
        scene_edges: &[Vec<usize>],
        sorted: &[usize],
    ) -> Vec<Vec<usize>> {
        let mut depth = vec![0usize; edges.len()];
        for &i in sorted {
            depth[i] = edges[i]
                .iter()
                .map(|(d, _)| *d)
                .chain(scene_edges[i].iter().copied())
                .map(|d| depth[d] + 1)
                .max()
                .unwrap_or(0);
        }

        let max_depth = depth.iter().max().copied().unwrap_or(0);
        let mut waves: Vec<Vec<usize>> = vec![Vec::new(); if sorted.is_empty() { 0 } else { max_depth + 1 }];
        for &i in sorted {
            waves[depth[i]].push(i);
        }
        waves
    }

    /// Fail if any cross-namespace dependency is still unresolved
    pub fn ensure_closed(&self) -> Result<(), GraphError> {
        match self.external.first() {
            None => Ok(()),
            Some((task, dependency)) => Err(GraphError::UnresolvedDependency {
                task: task.to_string(),
                dependency: dependency.to_string(),
            }),
        }
    }

    /// Whether every dependency resolves inside this graph
    pub fn is_closed(&self) -> bool {
        self.external.is_empty()
    }

    /// Unresolved cross-namespace dependencies as (task, dependency) pairs
    pub fn external_dependencies(&self) -> &[(TaskId, TaskId)] {
        &self.external
    }

    /// Get all task nodes
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// Node at an index
    pub fn node(&self, index: usize) -> &TaskNode {
        &self.nodes[index]
    }

    /// Get a specific task node
    pub fn get(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Index of a task
    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Ordinary and hard dependencies of a node
    pub fn dependencies(&self, index: usize) -> &[(usize, EdgeKind)] {
        &self.edges[index]
    }

    /// Scene dependencies of a node
    pub fn scene_dependencies(&self, index: usize) -> &[usize] {
        &self.scene_edges[index]
    }

    /// Nodes consuming this node through any edge
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Tasks that must be settled before `index` may run in `form`.
    ///
    /// The Real form waits on every dependency; the Scene form waits on its
    /// scene dependencies and hard dependencies.
    pub fn prerequisites(&self, index: usize, form: Form) -> Vec<usize> {
        let set: BTreeSet<usize> = match form {
            Form::Real => self.edges[index].iter().map(|(d, _)| *d).collect(),
            Form::Scene => self.edges[index]
                .iter()
                .filter(|(_, kind)| *kind == EdgeKind::Hard)
                .map(|(d, _)| *d)
                .chain(self.scene_edges[index].iter().copied())
                .collect(),
            Form::Pruned => BTreeSet::new(),
        };
        set.into_iter().collect()
    }

    /// Position of a node in topological order
    pub fn rank(&self, index: usize) -> usize {
        self.rank[index]
    }

    /// Get topologically sorted order (dependencies first)
    pub fn sorted(&self) -> &[usize] {
        &self.sorted_order
    }

    /// Get tasks grouped by depth
    pub fn waves(&self) -> &[Vec<usize>] {
        &self.waves
    }

    /// Namespaces present in the graph, default namespace first
    pub fn namespaces(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.nodes.iter().map(|n| n.id.namespace.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Whether a recipe exists in a namespace
    pub fn has_recipe(&self, namespace: &str, recipe: &str) -> bool {
        self.nodes
            .iter()
            .any(|n| n.id.namespace == namespace && n.id.recipe == recipe)
    }

    /// Get the total number of tasks
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a human-readable summary of the graph structure
    pub fn execution_plan(&self) -> String {
        let mut plan = String::new();
        for (i, wave) in self.waves.iter().enumerate() {
            plan.push_str(&format!("Wave {} ({} tasks):\n", i, wave.len()));
            for &idx in wave {
                let node = &self.nodes[idx];
                let marker = if node.coverable { " [coverable]" } else { "" };
                let deps: Vec<String> = self.edges[idx]
                    .iter()
                    .map(|(d, kind)| match kind {
                        EdgeKind::Normal => self.nodes[*d].id.to_string(),
                        EdgeKind::Hard => format!("{} (hard)", self.nodes[*d].id),
                    })
                    .collect();
                if deps.is_empty() {
                    plan.push_str(&format!("  {}{}\n", node.id, marker));
                } else {
                    plan.push_str(&format!(
                        "  {}{} (after: {})\n",
                        node.id,
                        marker,
                        deps.join(", ")
                    ));
                }
            }
        }
        plan
    }
}

/// Errors during graph construction
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Cyclic dependency detected
    #[error("Cyclic dependency detected among tasks: {0}")]
    CyclicDependency(String),

    /// Two nodes share an id
    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    /// Dependency on a task absent from the same namespace
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    MissingDependency { task: String, dependency: String },

    /// Cross-namespace dependency left unresolved after composition
    #[error("Task '{task}' depends on '{dependency}' in a namespace that was not composed")]
    UnresolvedDependency { task: String, dependency: String },

    /// Node violates a construction invariant
    #[error("Malformed task '{task}': {reason}")]
    MalformedNode { task: String, reason: String },

    /// Task not found in pipeline
    #[error("Task '{0}' not found in pipeline configuration")]
    TaskNotFound(String),

    /// Recipe not found
    #[error("Recipe not found: {0}")]
    RecipeNotFound(String),

    /// Namespace registered twice
    #[error("Duplicate namespace: '{0}'")]
    DuplicateNamespace(String),

    /// Text that does not parse as a task id
    #[error("Invalid task id: '{0}'")]
    InvalidTaskId(String),
}
