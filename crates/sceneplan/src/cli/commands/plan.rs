//! Plan command: decide every task's form without executing anything

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use sceneplan_tasks::{plan, Coverage, Form, PruneReason};

use crate::cli::project::SelectionArgs;
use crate::cli::{Cli, OutputFormat, Project};

/// Show which tasks would run, restore from cache, or be skipped
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Targets: recipe, recipe:task, mc:<namespace>:recipe[:task]
    #[arg(required = true)]
    pub targets: Vec<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Also list tasks that will not execute
    #[arg(long)]
    pub all: bool,
}

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(targets = ?self.targets, "executing plan command");
        let project = Project::load()?;
        let composition = project.select(&self.targets, &self.selection)?;
        let policy = project.policy(&self.selection)?;
        let graph = composition.graph;

        let plan = plan(
            Arc::clone(&graph),
            composition.oracle,
            &composition.requested,
            policy,
        )
        .await?;

        let entries: Vec<_> = plan
            .entries(&graph)
            .into_iter()
            .filter(|e| self.all || e.form.is_live())
            .collect();

        if cli.format == OutputFormat::Json {
            let output = serde_json::json!({
                "requested": plan.requested.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                "queries": plan.queries,
                "executed": plan.live_set.executed(),
                "tasks": entries,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if cli.quiet {
            return Ok(());
        }

        let real = plan.live_set.with_form(Form::Real).len();
        let scene = plan.live_set.with_form(Form::Scene).len();
        let pruned = plan.live_set.with_form(Form::Pruned).len();
        println!(
            "{} {} to run, {} to restore from cache, {} skipped ({} validity check{})",
            style("→").blue(),
            style(real).bold(),
            style(scene).cyan(),
            pruned,
            plan.queries,
            if plan.queries == 1 { "" } else { "s" }
        );
        println!();

        for entry in &entries {
            let marker = match entry.form {
                Form::Real => style("▸").green(),
                Form::Scene => style("↺").cyan(),
                Form::Pruned => style("○").dim(),
            };
            let name = entry.executes_as.as_deref().unwrap_or(entry.task.as_str());
            let mut line = format!("  {} {}", marker, name);
            if entry.coverage == Some(Coverage::Covered) && entry.form == Form::Real {
                line.push_str(&style(" (cached, but must run)").dim().to_string());
            }
            if entry.reason == Some(PruneReason::Enforcement) {
                line.push_str(&style(" (not permitted to run)").yellow().to_string());
            }
            println!("{}", line);
        }

        Ok(())
    }
}
