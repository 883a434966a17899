//! Composing multiconfig namespaces built from one configuration.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use sceneplan_core::config::{ExtraDependency, RecipeConfig};
use sceneplan_tasks::{
    resolve_targets, CollectingReporter, DryRunSink, EnforcementPolicy, Form, GraphError,
    NamespaceComposer, SchedulerOptions, StaticOracle, TaskGraph, TaskId, TaskScheduler,
};

fn config() -> sceneplan_core::Config {
    let mut config = common::config();
    config.multiconfig.namespaces = vec!["mc1".to_string()];

    let mut e1 = RecipeConfig::new("e1");
    e1.namespaces = vec!["mc1".to_string()];
    e1.extra_depends = vec![ExtraDependency {
        task: "package".to_string(),
        on: "a1:package".to_string(),
        hard: true,
    }];
    config.recipes.push(e1);
    config
}

#[test]
fn test_namespace_graph_keeps_foreign_edges_external() {
    let config = config();
    let graph = TaskGraph::from_config("mc1", &config).unwrap();

    assert!(graph.has_recipe("mc1", "e1"));
    assert!(graph.has_recipe("mc1", "a1"));
    assert!(!graph.has_recipe("mc1", "d1"));
    assert!(!graph.is_closed());
    assert_eq!(
        graph.external_dependencies(),
        &[(
            TaskId::in_namespace("mc1", "e1", "package"),
            TaskId::new("a1", "package")
        )]
    );
    assert!(matches!(
        graph.ensure_closed(),
        Err(GraphError::UnresolvedDependency { .. })
    ));

    let default = TaskGraph::from_config("", &config).unwrap();
    assert!(!default.has_recipe("", "e1"));
}

#[tokio::test]
async fn test_hard_edge_across_namespaces() {
    let config = config();
    let default_oracle = Arc::new(StaticOracle::new(["a1:*"]).unwrap());
    let mc1_oracle = Arc::new(StaticOracle::empty());

    let mut composer = NamespaceComposer::new();
    for namespace in config.namespaces() {
        let graph = TaskGraph::from_config(&namespace, &config).unwrap();
        let oracle = if namespace.is_empty() {
            default_oracle.clone()
        } else {
            mc1_oracle.clone()
        };
        composer.add_namespace(&namespace, graph, oracle).unwrap();
    }
    let composition = composer.compose().unwrap();
    let requested =
        resolve_targets(&composition.graph, &["mc:mc1:e1"], "build").unwrap();

    let scheduler = TaskScheduler::new(
        SchedulerOptions::default(),
        composition.oracle.clone(),
        Arc::new(DryRunSink),
        Arc::new(CollectingReporter::default()),
    );
    let report = scheduler
        .run(
            Arc::clone(&composition.graph),
            &requested,
            EnforcementPolicy::disabled(),
        )
        .await
        .unwrap();
    assert!(report.is_success());

    let executed: BTreeSet<String> = report
        .executed()
        .iter()
        .filter(|t| !t.starts_with("mc:"))
        .cloned()
        .collect();
    let expected: BTreeSet<String> = common::real(
        "a1",
        &[
            "fetch",
            "unpack",
            "patch",
            "prepare_recipe_sysroot",
            "configure",
            "compile",
            "install",
            "package",
        ],
    )
    .into_iter()
    .collect();
    assert_eq!(executed, expected);

    // The covered task runs real and nothing in the default namespace is asked about
    assert_eq!(
        report.live_set.form(&TaskId::new("a1", "package")),
        Some(Form::Real)
    );
    assert_eq!(default_oracle.query_count(), 0);

    let e1_tasks = report
        .executed()
        .iter()
        .filter(|t| t.starts_with("mc:mc1:e1:"))
        .count();
    assert_eq!(e1_tasks, common::RECIPE_TASKS.len());
    assert!(!report
        .executed()
        .iter()
        .any(|t| t.starts_with("mc:mc1:a1:")));
}
