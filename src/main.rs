//! Scenario harness CLI
//!
//! Drives an external service through scripted command steps and checks the
//! exact output of each one.

use clap::Parser;
use harness::{cli, commands, common};
use commands::Commands;

/// Exit code for usage, configuration and loading errors
const EXIT_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "harness", about = "Scripted integration-test harness")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    common::logging::init_cli(cli.command.verbose(), !cli.command.no_color());

    match cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(EXIT_ERROR);
        }
    }
}
