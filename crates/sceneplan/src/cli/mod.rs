//! CLI definition and command handling

pub mod commands;
pub mod output;
mod project;

use clap::{Parser, Subcommand};

use commands::{
    CacheCommand, CompletionsCommand, GraphCommand, InitCommand, PlanCommand, RunCommand,
    ValidateCommand,
};

pub use project::Project;

/// sceneplan - cache-aware build task planner and scheduler
#[derive(Debug, Parser)]
#[command(name = "sceneplan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build targets, restoring cached artifacts where possible
    Run(RunCommand),

    /// Show which tasks would run, restore from cache, or be skipped
    Plan(PlanCommand),

    /// Show the task graph
    Graph(GraphCommand),

    /// Artifact stamp management
    Cache(CacheCommand),

    /// Validate configuration and the task graph
    Validate(ValidateCommand),

    /// Initialize a new sceneplan configuration
    Init(InitCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Plan(ref cmd) => cmd.execute(&self),
            Commands::Graph(ref cmd) => cmd.execute(&self),
            Commands::Cache(ref cmd) => cmd.execute(&self),
            Commands::Validate(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }
}
