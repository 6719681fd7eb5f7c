//! CLI command handling
//!
//! Dispatches CLI commands to the scenario engine and formats output.

mod output;

use std::collections::BTreeSet;
use std::path::PathBuf;

use colored::Colorize;

use crate::commands::{Commands, CommonArgs};
use crate::common::config::Config;
use crate::common::{parse_key_value, Result};
use crate::runner::ProcessRunner;
use crate::testing::{
    load_scenarios, CancelSignal, Harness, RunOptions, Scenario, Vars,
};

use output::ConsoleReporter;

/// Exit code when every scenario passed
pub const EXIT_PASS: i32 = 0;
/// Exit code when any scenario failed, or a check found problems
pub const EXIT_FAIL: i32 = 1;

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            paths,
            verbose,
            json,
            timeout,
            common,
        } => run(paths, verbose, json, timeout, common).await,

        Commands::Check { paths, common } => check(paths, common),
    }
}

fn load_config(common: &CommonArgs) -> Result<Config> {
    let config = match &common.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if common.no_color || !config.output.color {
        colored::control::set_override(false);
    }
    Ok(config)
}

fn parse_vars(raw: &[String]) -> Result<Vars> {
    raw.iter().map(|pair| parse_key_value(pair)).collect()
}

async fn run(
    paths: Vec<PathBuf>,
    verbose: bool,
    json: bool,
    timeout: Option<u64>,
    common: CommonArgs,
) -> Result<i32> {
    let mut config = load_config(&common)?;
    if let Some(secs) = timeout {
        config.timeouts.step_secs = secs;
        config.timeouts.validate()?;
    }
    let vars = parse_vars(&common.vars)?;
    let scenarios = load_scenarios(&paths)?;

    let (handle, cancel) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{}",
                "Interrupted: tearing down current scenario (press Ctrl-C again to abort)".yellow()
            );
            handle.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let options = RunOptions {
        timeouts: config.timeouts.clone(),
        vars,
    };
    let harness = Harness::new(ProcessRunner::new(), options);
    let mut reporter = ConsoleReporter::new(!json, verbose);
    let report = harness.run(&scenarios, &cancel, &mut reporter).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_summary(&report);
    }

    Ok(report.exit_code())
}

fn check(paths: Vec<PathBuf>, common: CommonArgs) -> Result<i32> {
    load_config(&common)?;
    let overrides = parse_vars(&common.vars)?;
    let scenarios = load_scenarios(&paths)?;

    let mut problems = 0;
    for scenario in &scenarios {
        print_scenario_outline(scenario);

        let undefined = undefined_vars(scenario, &overrides);
        if !undefined.is_empty() {
            problems += 1;
            eprintln!(
                "  {} undefined variable(s): {}",
                "✗".red(),
                undefined.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
    }

    println!(
        "\n{} scenario(s) loaded, {} with problems",
        scenarios.len(),
        problems
    );
    Ok(if problems == 0 { EXIT_PASS } else { EXIT_FAIL })
}

/// Placeholders that neither the scenario nor `--var` define
fn undefined_vars(scenario: &Scenario, overrides: &Vars) -> BTreeSet<String> {
    let steps = scenario.steps.iter().map(|s| &s.command);
    scenario
        .setup
        .iter()
        .chain(steps)
        .chain(scenario.teardown.iter())
        .flat_map(|command| command.placeholders())
        .filter(|name| !scenario.vars.contains_key(name) && !overrides.contains_key(name))
        .collect()
}

fn print_scenario_outline(scenario: &Scenario) {
    println!("\n{}", scenario.name.white().bold());
    if let Some(source) = &scenario.source {
        println!("  {}", source.display().to_string().dimmed());
    }
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }
    for command in &scenario.setup {
        println!("  {} {}", "setup".cyan(), command.tokens.join(" "));
    }
    for (i, step) in scenario.steps.iter().enumerate() {
        println!(
            "  {} {}: {}",
            format!("step {}", i + 1).cyan(),
            step.name,
            step.expect.describe().dimmed()
        );
    }
    for command in &scenario.teardown {
        println!("  {} {}", "teardown".cyan(), command.tokens.join(" "));
    }
}
