//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run test scenarios defined in YAML files
    Run {
        /// Scenario files, or directories of *.yml/*.yaml files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print every command and its timing
        #[arg(long, short)]
        verbose: bool,

        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Default per-step timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Load and validate scenario files without running anything
    Check {
        /// Scenario files, or directories of *.yml/*.yaml files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Options shared by `run` and `check`
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Configuration file (default: platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Set a scenario variable, overriding the file's value
    /// Can be specified multiple times: --var game=test --var move=e2e4
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Run { verbose: true, .. })
    }

    pub fn no_color(&self) -> bool {
        match self {
            Commands::Run { common, .. } | Commands::Check { common, .. } => common.no_color,
        }
    }
}
