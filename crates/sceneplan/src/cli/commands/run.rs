//! Run command: build targets, restoring cached artifacts where possible

use std::sync::Arc;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sceneplan_tasks::{
    DryRunSink, ExecutionSink, Form, PruneReason, SchedulerOptions, ShellSink, TaskEvent,
    TaskReporter, TaskReporterRegistry, TaskScheduler, TaskStatus,
};

use crate::cli::project::SelectionArgs;
use crate::cli::{Cli, OutputFormat, Project};

/// Build targets
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Targets: recipe, recipe:task, mc:<namespace>:recipe[:task]
    #[arg(required = true)]
    pub targets: Vec<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Maximum concurrent tasks
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Stop dispatching new tasks after the first failure
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Decide forms and walk the run without executing commands
    #[arg(long)]
    pub dry_run: bool,
}

/// A run finished with tasks that did not succeed
#[derive(Debug, thiserror::Error)]
#[error("run failed: {failed} failed, {blocked} blocked, {skipped} skipped")]
pub struct RunFailed {
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(targets = ?self.targets, dry_run = self.dry_run, "executing run command");
        let project = Project::load()?;
        let composition = project.select(&self.targets, &self.selection)?;
        let policy = project.policy(&self.selection)?;
        let graph = composition.graph;
        let text = cli.format == OutputFormat::Text;

        let concurrency = self
            .jobs
            .or(project.config.tasks.concurrency)
            .unwrap_or_else(|| SchedulerOptions::default().concurrency);
        if concurrency == 0 {
            anyhow::bail!("--jobs must be at least 1");
        }
        let options = SchedulerOptions {
            concurrency,
            stop_on_failure: self.stop_on_failure || project.config.tasks.stop_on_failure,
        };

        let sink: Arc<dyn ExecutionSink> = if self.dry_run {
            Arc::new(DryRunSink)
        } else {
            let mut sink = ShellSink::new(project.root.clone());
            if project.uses_stamps(Some(&self.selection)) {
                sink = sink.with_store(Arc::new(project.stamp_store()));
            }
            Arc::new(sink)
        };

        let mut reporters = TaskReporterRegistry::new();
        if !cli.quiet && text {
            println!(
                "{} {} target{} over {} task{}{}",
                style("→").blue(),
                composition.requested.len(),
                if composition.requested.len() == 1 { "" } else { "s" },
                graph.len(),
                if graph.len() == 1 { "" } else { "s" },
                if policy.is_enabled() {
                    style(" (enforcing)").yellow().to_string()
                } else {
                    String::new()
                }
            );
            if self.dry_run {
                println!("{}", style("[DRY RUN - no commands will be executed]").yellow().bold());
            }
            println!();
            reporters.register(ConsoleReporter::new(cli.verbose));
        }

        let scheduler = TaskScheduler::new(options, composition.oracle, sink, Arc::new(reporters));
        let report = scheduler
            .run(Arc::clone(&graph), &composition.requested, policy)
            .await?;

        if cli.format == OutputFormat::Json {
            let summary = serde_json::json!({
                "success": report.is_success(),
                "duration_ms": report.duration.as_millis(),
                "executed": report.executed(),
                "tasks": report.results.iter().map(|r| {
                    let (status, detail) = match &r.status {
                        TaskStatus::Success => ("success", None),
                        TaskStatus::Failed(e) => ("failed", Some(e.clone())),
                        TaskStatus::Blocked(dep) => ("blocked", Some(dep.to_string())),
                        TaskStatus::Skipped(reason) => ("skipped", Some(reason.clone())),
                    };
                    serde_json::json!({
                        "task": r.id.to_string(),
                        "form": r.form,
                        "executed_as": r.name(&graph).to_string(),
                        "status": status,
                        "detail": detail,
                        "duration_ms": r.duration.as_millis(),
                    })
                }).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        if report.is_success() {
            return Ok(());
        }

        let failed = report.count(|s| matches!(s, TaskStatus::Failed(_)));
        let blocked = report.count(|s| matches!(s, TaskStatus::Blocked(_)));
        let skipped = report.count(|s| matches!(s, TaskStatus::Skipped(_)));

        if !cli.quiet && text {
            println!();
            for r in &report.results {
                if let TaskStatus::Failed(ref err) = r.status {
                    println!("    {} {}: {}", style("✗").red(), r.name(&graph), err);
                }
            }
        }

        Err(RunFailed {
            failed,
            blocked,
            skipped,
        }
        .into())
    }
}

/// Console reporter with a progress bar over live tasks
struct ConsoleReporter {
    verbose: bool,
    progress: ProgressBar,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        let progress = ProgressBar::new(0);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { verbose, progress }
    }

    fn line(&self, line: String) {
        self.progress.suspend(|| println!("{}", line));
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::FormAssigned { form, .. } if form.is_live() => {
                self.progress.inc_length(1);
            }
            TaskEvent::Pruned {
                id,
                reason: PruneReason::Enforcement,
            } => {
                self.line(format!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(id).yellow(),
                    style("(not permitted to run)").dim()
                ));
            }
            TaskEvent::OracleError { id, error } => {
                self.line(format!(
                    "  {} {} {}",
                    style("!").yellow(),
                    id,
                    style(format!("(validity check failed: {})", error)).dim()
                ));
            }
            TaskEvent::Started { name, .. } => {
                self.progress.set_message(name.to_string());
                if self.verbose {
                    self.line(format!("  {} {}", style("▸").dim(), style(name).bold()));
                }
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if self.verbose {
                    let prefix = format!("[{}]", id);
                    let prefix = if *is_stderr {
                        style(prefix).red().dim()
                    } else {
                        style(prefix).dim()
                    };
                    self.line(format!("    {} {}", prefix, line));
                }
            }
            TaskEvent::Completed {
                name,
                form,
                duration,
                ..
            } => {
                self.progress.inc(1);
                let restored = if *form == Form::Scene {
                    format!(" {}", style("(restored)").cyan())
                } else {
                    String::new()
                };
                self.line(format!(
                    "  {} {}{} {}",
                    style("✓").green(),
                    style(name).green(),
                    restored,
                    style(format!("{:.1}s", duration.as_secs_f64())).dim()
                ));
            }
            TaskEvent::Failed {
                name,
                duration,
                error,
                ..
            } => {
                self.progress.inc(1);
                self.line(format!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(name).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                ));
            }
            TaskEvent::Blocked { id, dependency } => {
                self.progress.inc(1);
                self.line(format!(
                    "  {} {} {}",
                    style("⊘").red(),
                    style(id).red(),
                    style(format!("(blocked by {})", dependency)).dim()
                ));
            }
            TaskEvent::Skipped { id, form, reason } => {
                // Undecided tasks never added to the length
                if form.is_some() {
                    self.progress.inc(1);
                }
                self.line(format!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(id).yellow(),
                    style(format!("({})", reason)).dim()
                ));
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                scene,
                blocked,
                skipped,
                duration,
            } => {
                self.progress.finish_and_clear();
                println!();
                println!(
                    "  {} {}/{} succeeded ({} restored), {} failed, {} blocked, {} skipped ({:.1}s)",
                    if *failed + *blocked + *skipped == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    succeeded,
                    total,
                    scene,
                    failed,
                    blocked,
                    skipped,
                    duration.as_secs_f64()
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneplan_tasks::TaskId;
    use std::time::Duration;

    #[test]
    fn test_progress_tracks_live_tasks() {
        let reporter = ConsoleReporter::new(false);
        let id = TaskId::new("a1", "package");
        reporter.report(&TaskEvent::FormAssigned {
            id: id.clone(),
            form: Form::Scene,
        });
        reporter.report(&TaskEvent::FormAssigned {
            id: TaskId::new("a1", "compile"),
            form: Form::Pruned,
        });
        assert_eq!(reporter.progress.length(), Some(1));

        reporter.report(&TaskEvent::Completed {
            id: id.clone(),
            form: Form::Scene,
            name: id.scene_variant(),
            duration: Duration::from_millis(5),
        });
        assert_eq!(reporter.progress.position(), 1);
    }

    #[test]
    fn test_progress_ignores_undecided_skips() {
        let reporter = ConsoleReporter::new(false);
        let decided = TaskId::new("a1", "compile");
        reporter.report(&TaskEvent::FormAssigned {
            id: decided.clone(),
            form: Form::Real,
        });
        reporter.report(&TaskEvent::Skipped {
            id: TaskId::new("a1", "package"),
            form: None,
            reason: "form undecided when the run ended".to_string(),
        });
        assert_eq!(reporter.progress.position(), 0);

        reporter.report(&TaskEvent::Skipped {
            id: decided,
            form: Some(Form::Real),
            reason: "run stopped after a failure".to_string(),
        });
        assert_eq!(reporter.progress.position(), 1);
        assert_eq!(reporter.progress.length(), Some(1));
    }

    #[test]
    fn test_run_failed_message() {
        let err = RunFailed {
            failed: 1,
            blocked: 2,
            skipped: 0,
        };
        assert_eq!(err.to_string(), "run failed: 1 failed, 2 blocked, 0 skipped");
    }
}
