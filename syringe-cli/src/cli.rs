//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Syringe -- discover lockfiles across a fleet of repositories and enroll them
/// into Phylum analysis.
///
/// Use `syringe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "syringe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the syringe.toml configuration file.
    #[arg(short, long, global = true, default_value = "syringe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: list, discover, create projects, analyze.
    Run(RunArgs),

    /// List repositories visible to the configured backend.
    ListRepos(ListReposArgs),

    /// List projects in the Phylum registry.
    ListProjects(ListProjectsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run the full pipeline once.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip lockfiles whose project could not be created up front instead of
    /// creating it right before analysis.
    #[arg(long)]
    pub no_jit_create: bool,
}

// ---- list-repos ----

/// List repositories, optionally fetching their lockfiles.
#[derive(Args, Debug)]
pub struct ListReposArgs {
    /// Fetch each repository's lockfiles and show which are enrolled in the registry.
    #[arg(long)]
    pub hydrate: bool,
}

// ---- list-projects ----

/// List registry projects.
#[derive(Args, Debug)]
pub struct ListProjectsArgs {
    /// Only show projects created by syringe (`SYR-` prefix).
    #[arg(long)]
    pub managed: bool,
}

// ---- config ----

/// Manage syringe configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults), secrets redacted.
    Show {
        /// Show only a specific section (general, vcs, registry, pipeline).
        #[arg(long)]
        section: Option<String>,
    },
}
