//! Shared fixture: a small distro-style pipeline with four recipes.
//!
//! a1 and c1 are standalone, b1 depends on a1, and d1 depends on a1 with
//! hard edges from its package task to a1's package writers.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use sceneplan_core::config::{Config, ExtraDependency, PipelineTask, RecipeConfig};
use sceneplan_tasks::{
    resolve_targets, CollectingReporter, DryRunSink, EnforcementPolicy, RunReport,
    SchedulerOptions, StaticOracle, TaskGraph, TaskScheduler,
};

fn task(depends_on: &[&str]) -> PipelineTask {
    PipelineTask {
        depends_on: strings(depends_on),
        ..PipelineTask::default()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Every task a full build of one recipe carries
pub const RECIPE_TASKS: [&str; 14] = [
    "build",
    "compile",
    "configure",
    "fetch",
    "install",
    "package",
    "package_qa",
    "package_write_ipk",
    "package_write_rpm",
    "packagedata",
    "patch",
    "populate_sysroot",
    "prepare_recipe_sysroot",
    "unpack",
];

pub fn config() -> Config {
    let mut config = Config::default();
    let pipeline = &mut config.pipeline;

    pipeline.insert("fetch".into(), task(&[]));
    pipeline.insert("unpack".into(), task(&["fetch"]));
    pipeline.insert("patch".into(), task(&["unpack"]));
    pipeline.insert(
        "prepare_recipe_sysroot".into(),
        PipelineTask {
            recipe_depends_on: strings(&["populate_sysroot"]),
            ..task(&["patch"])
        },
    );
    pipeline.insert("configure".into(), task(&["prepare_recipe_sysroot"]));
    pipeline.insert("compile".into(), task(&["configure"]));
    pipeline.insert("install".into(), task(&["compile"]));
    pipeline.insert(
        "populate_sysroot".into(),
        PipelineTask {
            coverable: true,
            recipe_scene_depends_on: strings(&["populate_sysroot"]),
            ..task(&["install"])
        },
    );
    pipeline.insert(
        "package".into(),
        PipelineTask {
            coverable: true,
            recipe_depends_on: strings(&["packagedata"]),
            ..task(&["install"])
        },
    );
    pipeline.insert(
        "packagedata".into(),
        PipelineTask {
            coverable: true,
            recipe_scene_depends_on: strings(&["packagedata"]),
            ..task(&["package"])
        },
    );
    pipeline.insert(
        "package_qa".into(),
        PipelineTask {
            coverable: true,
            ..task(&["package"])
        },
    );
    for writer in ["package_write_rpm", "package_write_ipk"] {
        pipeline.insert(
            writer.into(),
            PipelineTask {
                coverable: true,
                scene_depends_on: strings(&["packagedata"]),
                ..task(&["packagedata", "package"])
            },
        );
    }
    pipeline.insert(
        "build".into(),
        PipelineTask {
            recipe_depends_on: strings(&["package_write_rpm", "package_write_ipk"]),
            ..task(&[
                "package_qa",
                "package_write_rpm",
                "package_write_ipk",
                "populate_sysroot",
            ])
        },
    );

    let mut b1 = RecipeConfig::new("b1");
    b1.depends = strings(&["a1"]);

    let mut d1 = RecipeConfig::new("d1");
    d1.depends = strings(&["a1"]);
    d1.namespaces = strings(&["default"]);
    d1.extra_depends = ["a1:package_write_rpm", "a1:package_write_ipk"]
        .iter()
        .map(|on| ExtraDependency {
            task: "package".to_string(),
            on: on.to_string(),
            hard: true,
        })
        .collect();

    config.recipes = vec![RecipeConfig::new("a1"), b1, RecipeConfig::new("c1"), d1];
    config
}

pub fn graph() -> Arc<TaskGraph> {
    Arc::new(TaskGraph::from_config("", &config()).unwrap())
}

/// Executed names expected for `recipe`: every listed task in Real form
pub fn real(recipe: &str, tasks: &[&str]) -> Vec<String> {
    tasks.iter().map(|t| format!("{}:{}", recipe, t)).collect()
}

/// Executed names expected for `recipe`: every listed task in Scene form
pub fn scene(recipe: &str, tasks: &[&str]) -> Vec<String> {
    tasks
        .iter()
        .map(|t| format!("{}:{}_setscene", recipe, t))
        .collect()
}

/// Every Real task of a recipe except `without`
pub fn real_except(recipe: &str, without: &[&str]) -> Vec<String> {
    let tasks: Vec<&str> = RECIPE_TASKS
        .iter()
        .copied()
        .filter(|t| !without.contains(t))
        .collect();
    real(recipe, &tasks)
}

pub fn expected<I: IntoIterator<Item = Vec<String>>>(groups: I) -> BTreeSet<String> {
    groups.into_iter().flatten().collect()
}

/// Options for one scripted run
pub struct RunSpec<'a> {
    pub targets: &'a [&'a str],
    pub default_task: &'a str,
    pub valid: &'a [&'a str],
    pub policy: EnforcementPolicy,
}

impl<'a> RunSpec<'a> {
    pub fn new(targets: &'a [&'a str]) -> Self {
        Self {
            targets,
            default_task: "build",
            valid: &[],
            policy: EnforcementPolicy::disabled(),
        }
    }

    pub fn valid(mut self, valid: &'a [&'a str]) -> Self {
        self.valid = valid;
        self
    }

    pub fn default_task(mut self, task: &'a str) -> Self {
        self.default_task = task;
        self
    }

    pub fn policy(mut self, policy: EnforcementPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Run the fixture with a dry-run sink and return the report
pub async fn run(spec: RunSpec<'_>) -> (RunReport, Arc<CollectingReporter>) {
    let graph = graph();
    let requested = resolve_targets(&graph, spec.targets, spec.default_task).unwrap();
    let reporter = Arc::new(CollectingReporter::default());
    let scheduler = TaskScheduler::new(
        SchedulerOptions {
            concurrency: 4,
            stop_on_failure: false,
        },
        Arc::new(StaticOracle::new(spec.valid).unwrap()),
        Arc::new(DryRunSink),
        reporter.clone(),
    );
    let report = scheduler.run(graph, &requested, spec.policy).await.unwrap();
    (report, reporter)
}

/// Executed names of a run, as a set
pub async fn executed(spec: RunSpec<'_>) -> BTreeSet<String> {
    let (report, _) = run(spec).await;
    assert!(report.is_success(), "run failed: {:?}", report.results);
    report.executed().iter().cloned().collect()
}
