//! Syringe command-line entry point.
//!
//! Loads configuration, initializes logging, and dispatches to the subcommand handlers
//! in [`commands`]. Errors are printed to stderr and mapped to exit codes via
//! [`error::CliError::exit_code`].

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use colored::Colorize;

use syringe_core::config::SyringeConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
    syringe_core::metrics::describe_all();

    let writer = OutputWriter::new(cli.output);
    let log_level = cli.log_level.as_deref();

    let result: Result<(), CliError> = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.config, log_level, &writer).await,
        Commands::ListRepos(args) => {
            commands::list_repos::execute(args, &cli.config, log_level, &writer).await
        }
        Commands::ListProjects(args) => {
            commands::list_projects::execute(args, &cli.config, log_level, &writer).await
        }
        Commands::Config(args) => {
            commands::config::execute(args, &cli.config, log_level, &writer).await
        }
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "command failed");
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

/// Set up tracing from the `[general]` section.
///
/// The file is read leniently here: a missing or invalid file falls back to defaults
/// so that `config validate` can still report the problem through normal output.
async fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let mut config = SyringeConfig::from_file(&cli.config)
        .await
        .unwrap_or_default();
    config.apply_env_overrides();
    if let Some(level) = cli.log_level.as_deref() {
        config.general.log_level = level.to_owned();
    }
    logging::init_tracing(&config.general)
}
