//! CLI commands

mod cache;
mod completions;
mod graph;
mod init;
mod plan;
mod run;
mod validate;

pub use cache::CacheCommand;
pub use completions::CompletionsCommand;
pub use graph::GraphCommand;
pub use init::InitCommand;
pub use plan::PlanCommand;
pub use run::{RunCommand, RunFailed};
pub use validate::ValidateCommand;
