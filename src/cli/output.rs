//! Human-readable progress and summary output
//!
//! Progress goes to stdout. Failure detail (expected vs actual, stderr of
//! the failing process) always goes to stderr, even in JSON mode.

use colored::Colorize;

use crate::testing::{
    CommandFailure, HarnessReport, RunObserver, RunReport, RunState, Scenario, StepReport,
};

pub struct ConsoleReporter {
    /// Print progress lines; when false only failure detail is written
    progress: bool,
    verbose: bool,
    state: RunState,
    header_printed: bool,
}

impl ConsoleReporter {
    pub fn new(progress: bool, verbose: bool) -> Self {
        Self {
            progress,
            verbose,
            state: RunState::Init,
            header_printed: false,
        }
    }

    fn section_header(&mut self) {
        if self.header_printed || !self.progress {
            return;
        }
        let title = match self.state {
            RunState::SettingUp => "Setup:",
            RunState::StepsRunning => "Steps:",
            RunState::TearingDown => "Teardown:",
            _ => return,
        };
        println!("\n{}", title.cyan());
        self.header_printed = true;
    }
}

impl RunObserver for ConsoleReporter {
    fn scenario_started(&mut self, scenario: &Scenario) {
        if !self.progress {
            return;
        }
        println!(
            "\n{} {}",
            "Running Scenario:".blue().bold(),
            scenario.name.white().bold()
        );
        if let Some(desc) = &scenario.description {
            println!("  {}", desc.dimmed());
        }
        if self.verbose {
            if let Some(source) = &scenario.source {
                println!("  {}", source.display().to_string().dimmed());
            }
        }
    }

    fn state_changed(&mut self, state: RunState) {
        self.state = state;
        self.header_printed = false;
    }

    fn hook_finished(&mut self, command: &str, failure: Option<&CommandFailure>) {
        self.section_header();
        match failure {
            None => {
                if self.progress {
                    println!("  {} {}", "✓".green(), command.dimmed());
                }
            }
            Some(failure) => {
                let (mark, label) = if self.state == RunState::TearingDown {
                    ("!".yellow(), "Teardown warning".yellow())
                } else {
                    ("✗".red(), "Setup failed".red())
                };
                if self.progress {
                    println!("  {} {}", mark, command);
                }
                eprintln!("{}: {}", label.bold(), command);
                eprintln!("  {}: {}", failure.kind.label(), failure.detail);
                print_stderr_block(failure.stderr.as_deref());
            }
        }
    }

    fn step_finished(&mut self, index: usize, step: &StepReport) {
        self.section_header();
        let step_num = index + 1;
        match step.outcome.failure() {
            None => {
                if self.progress {
                    if self.verbose {
                        println!(
                            "  {} Step {}: {} {}",
                            "✓".green(),
                            step_num,
                            step.name,
                            format!("({} ms)", step.elapsed_ms).dimmed()
                        );
                        if let Some(command) = &step.command {
                            println!("      {}", command.dimmed());
                        }
                    } else {
                        println!("  {} Step {}: {}", "✓".green(), step_num, step.name);
                    }
                }
            }
            Some(failure) => {
                if self.progress {
                    println!(
                        "  {} Step {}: {} ({})",
                        "✗".red(),
                        step_num,
                        step.name,
                        failure.kind.label()
                    );
                }
                eprintln!(
                    "{} step {} '{}': {}",
                    "FAILED".red().bold(),
                    step_num,
                    step.name,
                    failure.kind.label()
                );
                if let Some(command) = &step.command {
                    eprintln!("  command:  {}", command);
                }
                eprintln!("  expected: {}", failure.expected.green());
                eprintln!("  actual:   {}", failure.actual.red());
                if let Some(code) = failure.exit_code {
                    eprintln!("  exit code: {}", code);
                }
                print_stderr_block(failure.stderr.as_deref());
            }
        }
    }

    fn scenario_finished(&mut self, report: &RunReport) {
        if !self.progress {
            return;
        }
        if report.passed() {
            println!(
                "\n{} {}",
                "✓".green().bold(),
                format!(
                    "Passed ({}/{} steps)",
                    report.steps_passed(),
                    report.steps_total
                )
                .green()
                .bold()
            );
        } else {
            let reason = if report.interrupted {
                "Interrupted"
            } else if report.setup_failure.is_some() {
                "Setup Failed"
            } else {
                "Failed"
            };
            println!(
                "\n{} {}",
                "✗".red().bold(),
                format!(
                    "{} ({}/{} steps passed)",
                    reason,
                    report.steps_passed(),
                    report.steps_total
                )
                .red()
                .bold()
            );
        }
        if !report.teardown_warnings.is_empty() {
            println!(
                "  {}",
                format!("{} teardown warning(s)", report.teardown_warnings.len()).yellow()
            );
        }
    }
}

fn print_stderr_block(stderr: Option<&str>) {
    let Some(stderr) = stderr.map(str::trim_end).filter(|s| !s.is_empty()) else {
        return;
    };
    eprintln!("  stderr:");
    for line in stderr.lines() {
        eprintln!("    {}", line.dimmed());
    }
}

/// Final tally across all scenarios
pub fn print_summary(report: &HarnessReport) {
    let total = report.scenarios.len() + report.skipped.len();
    let failed = report.failed_count();
    println!("\n{}", "Summary:".cyan().bold());
    for run in &report.scenarios {
        let mark = if run.passed() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} ({}/{} steps)",
            mark,
            run.scenario,
            run.steps_passed(),
            run.steps_total
        );
    }
    for name in &report.skipped {
        println!("  {} {} (skipped)", "-".dimmed(), name.dimmed());
    }

    let line = format!(
        "{} of {} scenario(s) passed",
        report.scenarios.len() - failed,
        total
    );
    if report.passed {
        println!("\n{}\n", line.green().bold());
    } else if report.interrupted {
        println!("\n{} {}\n", line.red().bold(), "(interrupted)".yellow());
    } else {
        println!("\n{}\n", line.red().bold());
    }
}
