//! Cache management command

use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;

use crate::cli::{Cli, OutputFormat, Project};

/// Artifact stamp management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove old stamps
    Prune(CachePruneCommand),
    /// Show stamp statistics
    Status(CacheStatusCommand),
    /// Remove all stamps
    Clean(CacheCleanCommand),
}

/// Prune old stamps
#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days (default: 7)
    #[arg(long, default_value = "7")]
    pub max_age_days: u64,
}

/// Show stamp statistics
#[derive(Debug, Args)]
pub struct CacheStatusCommand;

/// Remove all stamps
#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = Project::load()?;
        match &self.action {
            CacheAction::Prune(cmd) => cmd.execute(cli, &project),
            CacheAction::Status(cmd) => cmd.execute(cli, &project),
            CacheAction::Clean(cmd) => cmd.execute(cli, &project),
        }
    }
}

impl CachePruneCommand {
    fn execute(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        let store = project.stamp_store();
        let max_age = Duration::from_secs(self.max_age_days * 24 * 60 * 60);

        if !cli.quiet && cli.format == OutputFormat::Text {
            println!(
                "{} Pruning stamps older than {} days...",
                style("→").blue(),
                self.max_age_days
            );
        }

        let stats = store.prune(max_age)?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "total": stats.total,
                "removed": stats.removed,
                "kept": stats.kept,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!(
                "  {} Removed {} of {} stamps ({} kept)",
                style("✓").green(),
                stats.removed,
                stats.total,
                stats.kept
            );
        }

        Ok(())
    }
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        let store = project.stamp_store();
        let stats = store.status()?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "enabled": project.config.cache.enabled,
                "entries": stats.entries,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "cache_dir": store.dir().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", style("Artifact Stamps").bold());
            println!();
            println!("  Location: {}", style(store.dir().display()).cyan());
            println!(
                "  Enabled:  {}",
                if project.config.cache.enabled { "yes" } else { "no" }
            );
            println!("  Entries:  {}", stats.entries);
            println!("  Size:     {}", style(stats.formatted_size()).yellow());
        }

        Ok(())
    }
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli, project: &Project) -> anyhow::Result<()> {
        let store = project.stamp_store();
        let stamp_dir = store.dir().to_path_buf();

        if !stamp_dir.exists() {
            if !cli.quiet {
                println!("{} Stamp directory does not exist.", style("✓").green());
            }
            return Ok(());
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("Remove all stamps at {}?", stamp_dir.display()))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        store.clean()?;

        if !cli.quiet {
            println!(
                "{} Stamps cleared at {}",
                style("✓").green(),
                style(stamp_dir.display()).cyan()
            );
        }

        Ok(())
    }
}
