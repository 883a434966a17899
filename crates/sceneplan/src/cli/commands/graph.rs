//! Graph command: show the composed task graph

use clap::Args;
use console::style;
use tracing::info;

use crate::cli::{Cli, OutputFormat, Project};

/// Show the task graph in execution waves
#[derive(Debug, Args)]
pub struct GraphCommand {
    /// Only show tasks of this recipe
    #[arg(long)]
    pub recipe: Option<String>,
}

impl GraphCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(recipe = ?self.recipe, "executing graph command");
        let project = Project::load()?;
        let composition = project.compose(false)?;
        let graph = composition.graph;

        let shown = |i: &usize| {
            self.recipe
                .as_deref()
                .map_or(true, |r| graph.node(*i).id.recipe == r)
        };

        if cli.format == OutputFormat::Json {
            let waves: Vec<serde_json::Value> = graph
                .waves()
                .iter()
                .enumerate()
                .map(|(i, wave)| {
                    serde_json::json!({
                        "wave": i,
                        "tasks": wave.iter().filter(|i| shown(*i)).map(|&t| {
                            let node = graph.node(t);
                            serde_json::json!({
                                "task": node.id.to_string(),
                                "coverable": node.coverable,
                                "depends_on": graph.dependencies(t).iter().map(|(d, kind)| {
                                    serde_json::json!({
                                        "task": graph.node(*d).id.to_string(),
                                        "kind": kind,
                                    })
                                }).collect::<Vec<_>>(),
                                "scene_depends_on": graph.scene_dependencies(t).iter()
                                    .map(|d| graph.node(*d).id.to_string())
                                    .collect::<Vec<_>>(),
                            })
                        }).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&waves)?);
            return Ok(());
        }

        if cli.quiet {
            return Ok(());
        }

        println!(
            "{} {} tasks across {} namespace{}",
            style("→").blue(),
            graph.len(),
            graph.namespaces().len(),
            if graph.namespaces().len() == 1 { "" } else { "s" }
        );
        println!();

        if self.recipe.is_none() {
            print!("{}", graph.execution_plan());
            return Ok(());
        }

        for (i, wave) in graph.waves().iter().enumerate() {
            let tasks: Vec<_> = wave.iter().filter(|t| shown(*t)).collect();
            if tasks.is_empty() {
                continue;
            }
            println!("{}", style(format!("Wave {}", i)).bold());
            for &t in tasks {
                println!("  {}", graph.node(t).id);
            }
        }

        Ok(())
    }
}
