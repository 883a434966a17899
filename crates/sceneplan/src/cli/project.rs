//! Loading a project and composing its task graph

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::debug;

use sceneplan_core::config::{load_config_from_dir, Config};
use sceneplan_tasks::{
    resolve_targets, AnyOracle, ArtifactStore, Composition, EnforcementPolicy, NamespaceComposer,
    StaticOracle, TaskGraph, ValidityOracle,
};

/// Target and policy options shared by `run` and `plan`
#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Task a bare recipe target expands to (default: tasks.default_task)
    #[arg(short = 'c', long = "cmd")]
    pub cmd: Option<String>,

    /// Only requested and allowed tasks may run for real
    #[arg(long)]
    pub enforce: bool,

    /// Tasks permitted to run for real under enforcement (can be repeated)
    #[arg(long, value_name = "PATTERN")]
    pub allow: Vec<String>,

    /// Ignore artifact stamps (cache.valid still applies)
    #[arg(long)]
    pub no_cache: bool,
}

/// A loaded configuration and the directory it applies to
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub config_path: PathBuf,
}

impl Project {
    /// Load the configuration found from the current directory upwards
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_from_dir(&cwd)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        debug!(root = %root.display(), "project loaded");
        Ok(Self {
            root,
            config,
            config_path,
        })
    }

    /// Stamp store configured for this project
    pub fn stamp_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.root.join(&self.config.cache.dir))
    }

    /// Whether stamps are consulted and recorded
    pub fn uses_stamps(&self, selection: Option<&SelectionArgs>) -> bool {
        self.config.cache.enabled && !selection.is_some_and(|s| s.no_cache)
    }

    /// Build every namespace graph and merge them, each with its own oracle
    pub fn compose(&self, use_stamps: bool) -> anyhow::Result<Composition> {
        let mut composer = NamespaceComposer::new();
        for namespace in self.config.namespaces() {
            let graph = TaskGraph::from_config(&namespace, &self.config)?;
            let oracle = self.oracle_for(&graph, use_stamps)?;
            composer.add_namespace(&namespace, graph, oracle)?;
        }
        Ok(composer.compose()?)
    }

    /// Compose the graph and resolve the selected targets
    pub fn select(
        &self,
        targets: &[String],
        selection: &SelectionArgs,
    ) -> anyhow::Result<Composition> {
        let mut composition = self.compose(self.uses_stamps(Some(selection)))?;
        let default_task = selection
            .cmd
            .as_deref()
            .unwrap_or(self.config.tasks.default_task.as_str());
        composition.requested = resolve_targets(&composition.graph, targets, default_task)?;
        Ok(composition)
    }

    /// Enforcement policy from configuration and command-line flags
    pub fn policy(&self, selection: &SelectionArgs) -> anyhow::Result<EnforcementPolicy> {
        if !selection.enforce && !self.config.enforcement.enabled {
            return Ok(EnforcementPolicy::disabled());
        }
        let allow = self
            .config
            .enforcement
            .allow
            .iter()
            .chain(&selection.allow);
        EnforcementPolicy::enforcing(allow).context("invalid enforcement allow list")
    }

    fn oracle_for(
        &self,
        graph: &TaskGraph,
        use_stamps: bool,
    ) -> anyhow::Result<Arc<dyn ValidityOracle>> {
        let mut oracle = AnyOracle::default();
        if !self.config.cache.valid.is_empty() {
            let valid = StaticOracle::new(&self.config.cache.valid)
                .context("invalid cache.valid pattern")?;
            oracle.push(Arc::new(valid));
        }
        if use_stamps {
            oracle.push(Arc::new(self.stamp_store().with_graph(graph)));
        }
        Ok(Arc::new(oracle))
    }
}
