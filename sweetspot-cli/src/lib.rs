// sweetspot-cli/src/lib.rs
//
// Library portion of the Sweetspot CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;
pub mod progress;

use anyhow::Context;
use std::path::Path;

use sweetspot_core::{OptimizerConfig, ProcessContext};

// Re-export items needed by the binary or integration tests
pub use cli::{AnalyzeArgs, Cli, Commands, OptimizeArgs};

/// Loads `--config` when given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<OptimizerConfig> {
    match path {
        Some(path) => OptimizerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(OptimizerConfig::default()),
    }
}

/// Runs the parsed command. Returns `true` when the run was cancelled.
pub fn run(cli: Cli, ctx: &ProcessContext) -> anyhow::Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Analyze(args) => {
            commands::run_analyze(args, &config, ctx)?;
            Ok(ctx.cancel.is_cancelled())
        }
        Commands::Optimize(args) => commands::run_optimize(args, &config, ctx),
        Commands::Codecs => {
            commands::run_codecs();
            Ok(false)
        }
    }
}
