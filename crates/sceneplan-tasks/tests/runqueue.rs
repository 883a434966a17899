//! Expected task sets for the distro-style fixture under different cache states.

mod common;

use common::{executed, expected, real, real_except, scene, RunSpec};
use sceneplan_core::config::validate_config;
use sceneplan_tasks::{EnforcementPolicy, Form, PruneReason, TaskId};

#[test]
fn test_fixture_is_valid_config() {
    validate_config(&common::config()).unwrap();
}

#[tokio::test]
async fn test_no_setscene_valid() {
    let tasks = executed(RunSpec::new(&["a1"])).await;
    assert_eq!(tasks, expected([real_except("a1", &[])]));
}

#[tokio::test]
async fn test_single_setscene_valid() {
    let tasks = executed(RunSpec::new(&["a1"]).valid(&["a1:package"])).await;
    assert_eq!(
        tasks,
        expected([real_except("a1", &["package"]), scene("a1", &["package"])])
    );
}

#[tokio::test]
async fn test_intermediate_setscene_valid() {
    let tasks =
        executed(RunSpec::new(&["a1"]).valid(&["a1:package", "a1:populate_sysroot"])).await;
    assert_eq!(
        tasks,
        expected([
            real(
                "a1",
                &[
                    "build",
                    "package_qa",
                    "package_write_ipk",
                    "package_write_rpm",
                    "packagedata",
                ]
            ),
            scene("a1", &["package", "populate_sysroot"]),
        ])
    );
}

#[tokio::test]
async fn test_intermediate_not_covered() {
    let valid = [
        "a1:package_write_ipk",
        "a1:package_write_rpm",
        "a1:packagedata",
        "a1:package_qa",
        "a1:populate_sysroot",
    ];
    let tasks = executed(RunSpec::new(&["a1"]).valid(&valid)).await;
    assert_eq!(
        tasks,
        expected([
            real("a1", &["build"]),
            scene(
                "a1",
                &[
                    "package_qa",
                    "package_write_ipk",
                    "package_write_rpm",
                    "packagedata",
                    "populate_sysroot",
                ]
            ),
        ])
    );
}

#[tokio::test]
async fn test_all_setscene_valid() {
    let tasks = executed(RunSpec::new(&["a1"]).valid(&["a1:*"])).await;
    assert_eq!(
        tasks,
        expected([
            real("a1", &["build"]),
            scene(
                "a1",
                &[
                    "package_qa",
                    "package_write_ipk",
                    "package_write_rpm",
                    "packagedata",
                    "populate_sysroot",
                ]
            ),
        ])
    );
}

#[tokio::test]
async fn test_explicit_task_below_coverable_tasks() {
    let tasks = executed(RunSpec::new(&["a1"]).default_task("patch").valid(&["a1:*"])).await;
    assert_eq!(
        tasks,
        expected([real("a1", &["fetch", "unpack", "patch"])])
    );
}

#[tokio::test]
async fn test_mixed_targets_all_valid() {
    let tasks = executed(
        RunSpec::new(&["a1:patch", "a1:do_populate_sysroot"]).valid(&["a1:*"]),
    )
    .await;
    assert_eq!(
        tasks,
        expected([
            real("a1", &["fetch", "unpack", "patch"]),
            scene("a1", &["populate_sysroot"]),
        ])
    );
}

#[tokio::test]
async fn test_unrelated_recipes() {
    let tasks = executed(RunSpec::new(&["c1:patch", "a1"])).await;
    assert_eq!(
        tasks,
        expected([
            real("c1", &["fetch", "unpack", "patch"]),
            real_except("a1", &[]),
        ])
    );
}

#[tokio::test]
async fn test_with_dependencies_nothing_valid() {
    let tasks = executed(RunSpec::new(&["b1"])).await;
    assert_eq!(
        tasks,
        expected([
            real_except("b1", &[]),
            real_except("a1", &["package_qa", "build"]),
        ])
    );
}

#[tokio::test]
async fn test_with_dependencies_upstream_valid() {
    let tasks = executed(RunSpec::new(&["b1"]).valid(&["a1:*"])).await;
    assert_eq!(
        tasks,
        expected([
            real_except("b1", &[]),
            scene(
                "a1",
                &[
                    "package_write_ipk",
                    "package_write_rpm",
                    "packagedata",
                    "populate_sysroot",
                ]
            ),
        ])
    );
}

#[tokio::test]
async fn test_with_dependencies_all_valid() {
    let tasks = executed(RunSpec::new(&["b1"]).valid(&["a1:*", "b1:*"])).await;
    assert_eq!(
        tasks,
        expected([
            real("b1", &["build"]),
            scene(
                "b1",
                &[
                    "package_qa",
                    "package_write_ipk",
                    "package_write_rpm",
                    "packagedata",
                    "populate_sysroot",
                ]
            ),
            scene(
                "a1",
                &[
                    "package_write_ipk",
                    "package_write_rpm",
                    "packagedata",
                    "populate_sysroot",
                ]
            ),
        ])
    );
}

#[tokio::test]
async fn test_hard_dependencies_nothing_valid() {
    let tasks = executed(RunSpec::new(&["d1"])).await;
    assert_eq!(
        tasks,
        expected([
            real_except("d1", &[]),
            real_except("a1", &["package_qa", "build"]),
        ])
    );
}

#[tokio::test]
async fn test_hard_dependencies_force_covered_upstream_real() {
    // d1:package runs real, so its hard prerequisites run real despite being cached
    let (report, _) = common::run(RunSpec::new(&["d1"]).valid(&["a1:*"])).await;
    assert!(report.is_success());

    let live = &report.live_set;
    for task in ["package_write_rpm", "package_write_ipk"] {
        assert_eq!(live.form(&TaskId::new("a1", task)), Some(Form::Real));
    }
    // The writers' own prerequisites are still restored from cache
    assert_eq!(live.form(&TaskId::new("a1", "package")), Some(Form::Scene));
    assert_eq!(live.form(&TaskId::new("a1", "packagedata")), Some(Form::Scene));
    assert_eq!(live.form(&TaskId::new("a1", "fetch")), Some(Form::Pruned));
    assert_eq!(live.form(&TaskId::new("a1", "build")), Some(Form::Pruned));
}

#[tokio::test]
async fn test_enforcement_allow_list() {
    let policy =
        EnforcementPolicy::enforcing(["a1:package_write_rpm", "a1:build"]).unwrap();
    let valid = [
        "a1:package",
        "a1:package_qa",
        "a1:packagedata",
        "a1:package_write_ipk",
        "a1:populate_sysroot",
    ];
    let tasks = executed(RunSpec::new(&["a1"]).valid(&valid).policy(policy)).await;
    assert_eq!(
        tasks,
        expected([
            real("a1", &["build", "package_write_rpm"]),
            scene(
                "a1",
                &[
                    "package",
                    "package_qa",
                    "package_write_ipk",
                    "packagedata",
                    "populate_sysroot",
                ]
            ),
        ])
    );
}

#[tokio::test]
async fn test_enforcement_prunes_uncovered_task() {
    let policy =
        EnforcementPolicy::enforcing(["a1:package_write_rpm", "a1:build"]).unwrap();
    let valid = [
        "a1:package",
        "a1:packagedata",
        "a1:package_write_ipk",
        "a1:populate_sysroot",
    ];
    let (report, _) =
        common::run(RunSpec::new(&["a1"]).valid(&valid).policy(policy)).await;
    assert!(report.is_success());

    let qa = TaskId::new("a1", "package_qa");
    assert_eq!(report.live_set.form(&qa), Some(Form::Pruned));
    assert!(!report.executed().iter().any(|t| t.contains("package_qa")));
    assert!(report.result(&qa).is_none());

    let plan = sceneplan_tasks::plan(
        common::graph(),
        std::sync::Arc::new(sceneplan_tasks::StaticOracle::new(valid).unwrap()),
        &[TaskId::new("a1", "build")],
        EnforcementPolicy::enforcing(["a1:package_write_rpm", "a1:build"]).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(plan.prune_reason(&qa), Some(PruneReason::Enforcement));
}
