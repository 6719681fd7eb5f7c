//! Scenario execution
//!
//! A run moves through
//! `Init → SettingUp → {StepsRunning → StepsComplete | SetupFailed} → TearingDown → Done`.
//! Teardown is entered on every path once setup has been attempted.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;

use crate::common::config::Timeouts;
use crate::runner::{CommandRunner, CommandSpec, ExecutionResult, RunError};

use super::report::{CommandFailure, RunReport, StepReport};
use super::step::{Failure, FailureKind, ScenarioStep, StepOutcome};
use super::template::{CommandTemplate, Vars};

/// States of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    SettingUp,
    SetupFailed,
    StepsRunning,
    StepsComplete,
    TearingDown,
    Done,
}

impl RunState {
    fn can_enter(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, SettingUp)
                | (SettingUp, SetupFailed)
                | (SettingUp, StepsRunning)
                | (StepsRunning, StepsComplete)
                | (SetupFailed, TearingDown)
                | (StepsComplete, TearingDown)
                | (TearingDown, Done)
        )
    }
}

/// Receives progress while a scenario runs
///
/// All methods default to doing nothing.
pub trait RunObserver {
    fn scenario_started(&mut self, _scenario: &Scenario) {}
    fn state_changed(&mut self, _state: RunState) {}
    /// A setup or teardown command finished; `failure` is `None` on success
    fn hook_finished(&mut self, _command: &str, _failure: Option<&CommandFailure>) {}
    fn step_finished(&mut self, _index: usize, _step: &StepReport) {}
    fn scenario_finished(&mut self, _report: &RunReport) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Cooperative cancellation shared between the signal handler and the runs
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Fires a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> CancelSignal {
        let (_tx, rx) = watch::channel(false);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone without firing
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Settings shared by every scenario in a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub timeouts: Timeouts,
    /// Variables that override those declared by the scenario
    pub vars: Vars,
}

/// One end-to-end test case: setup, ordered steps, teardown
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub vars: Vars,
    pub setup: Vec<CommandTemplate>,
    pub steps: Vec<ScenarioStep>,
    pub teardown: Vec<CommandTemplate>,
    /// Default per-command timeout for this scenario
    pub timeout: Option<Duration>,
    /// File the scenario was loaded from
    pub source: Option<PathBuf>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            vars: Vars::new(),
            setup: Vec::new(),
            steps: Vec::new(),
            teardown: Vec::new(),
            timeout: None,
            source: None,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_setup(mut self, command: CommandTemplate) -> Self {
        self.setup.push(command);
        self
    }

    pub fn with_step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_teardown(mut self, command: CommandTemplate) -> Self {
        self.teardown.push(command);
        self
    }

    /// Execute the scenario once
    ///
    /// Never fails: every problem ends up in the returned report.
    pub async fn run(
        &self,
        runner: &dyn CommandRunner,
        options: &RunOptions,
        cancel: &CancelSignal,
        observer: &mut dyn RunObserver,
    ) -> RunReport {
        let started = Instant::now();
        let mut vars = self.vars.clone();
        vars.extend(options.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut run = Run {
            scenario: self,
            runner,
            vars: &vars,
            cancel,
            observer,
            state: RunState::Init,
            report: RunReport::new(&self.name, self.steps.len()),
        };
        run.report.states.push(RunState::Init);
        run.observer.scenario_started(self);
        tracing::info!(scenario = %self.name, "Starting scenario");

        run.enter(RunState::SettingUp);
        let setup_timeout = self.timeout.unwrap_or_else(|| options.timeouts.setup());
        if run.setup(setup_timeout).await {
            run.enter(RunState::StepsRunning);
            let step_timeout = self.timeout.unwrap_or_else(|| options.timeouts.step());
            run.steps(step_timeout).await;
            run.enter(RunState::StepsComplete);
        } else {
            run.enter(RunState::SetupFailed);
        }

        run.enter(RunState::TearingDown);
        let teardown_timeout = self.timeout.unwrap_or_else(|| options.timeouts.teardown());
        run.teardown(teardown_timeout).await;
        run.enter(RunState::Done);

        let mut report = run.report;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            scenario = %self.name,
            passed = report.passed(),
            steps_run = report.steps.len(),
            steps_total = report.steps_total,
            "Scenario finished"
        );
        run.observer.scenario_finished(&report);
        report
    }
}

/// In-flight state of one scenario run
struct Run<'a, 'o> {
    scenario: &'a Scenario,
    runner: &'a dyn CommandRunner,
    vars: &'a Vars,
    cancel: &'a CancelSignal,
    observer: &'o mut dyn RunObserver,
    state: RunState,
    report: RunReport,
}

impl Run<'_, '_> {
    fn enter(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_enter(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(scenario = %self.scenario.name, from = ?self.state, to = ?next, "State transition");
        self.state = next;
        self.report.states.push(next);
        self.observer.state_changed(next);
    }

    /// Returns false on the first failing setup command
    async fn setup(&mut self, default_timeout: Duration) -> bool {
        for template in &self.scenario.setup {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(interrupted(template)),
                outcome = run_hook(self.runner, template, self.vars, default_timeout) => outcome,
            };
            match outcome {
                Ok(command) => self.observer.hook_finished(&command, None),
                Err(failure) => {
                    tracing::error!(
                        scenario = %self.scenario.name,
                        command = %failure.command,
                        kind = ?failure.kind,
                        "Setup failed: {}", failure.detail
                    );
                    if failure.kind == FailureKind::Interrupted {
                        self.report.interrupted = true;
                    }
                    self.observer.hook_finished(&failure.command, Some(&failure));
                    self.report.setup_failure = Some(failure);
                    return false;
                }
            }
        }
        true
    }

    /// Runs steps in order, stopping after the first failure
    async fn steps(&mut self, default_timeout: Duration) {
        for (index, step) in self.scenario.steps.iter().enumerate() {
            let started = Instant::now();
            let command = step.command.render(self.vars).ok().map(|c| c.to_string());

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => StepOutcome::Fail(Failure::interrupted(step.expect.text())),
                outcome = step.evaluate(self.runner, self.vars, default_timeout) => outcome,
            };
            if matches!(&outcome, StepOutcome::Fail(f) if f.kind == FailureKind::Interrupted) {
                self.report.interrupted = true;
            }

            let report = StepReport {
                name: step.name.clone(),
                command,
                outcome,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            let passed = report.passed();
            if let Some(failure) = report.outcome.failure() {
                tracing::warn!(
                    scenario = %self.scenario.name,
                    step = %step.name,
                    kind = ?failure.kind,
                    "Step failed"
                );
            }
            self.observer.step_finished(index, &report);
            self.report.steps.push(report);

            if !passed {
                break;
            }
        }
    }

    /// Attempts every teardown command; failures become warnings
    async fn teardown(&mut self, default_timeout: Duration) {
        // Not cancellable: this is what releases the external system
        for template in &self.scenario.teardown {
            match run_hook(self.runner, template, self.vars, default_timeout).await {
                Ok(command) => self.observer.hook_finished(&command, None),
                Err(failure) => {
                    tracing::warn!(
                        scenario = %self.scenario.name,
                        command = %failure.command,
                        kind = ?failure.kind,
                        "Teardown command failed: {}", failure.detail
                    );
                    self.observer.hook_finished(&failure.command, Some(&failure));
                    self.report.teardown_warnings.push(failure);
                }
            }
        }
    }
}

/// Run a setup/teardown command; only the exit status matters
async fn run_hook(
    runner: &dyn CommandRunner,
    template: &CommandTemplate,
    vars: &Vars,
    default_timeout: Duration,
) -> Result<String, CommandFailure> {
    let command: CommandSpec = template.render(vars).map_err(|e| CommandFailure {
        command: template.tokens.join(" "),
        kind: FailureKind::Template,
        detail: e.to_string(),
        stderr: None,
    })?;
    let line = command.to_string();
    let timeout = template.timeout.unwrap_or(default_timeout);

    match runner.run(&command, timeout).await {
        Ok(result) if result.success() => Ok(line),
        Ok(result) => Err(non_zero_exit(line, result)),
        Err(e) => Err(run_error(line, &e)),
    }
}

fn non_zero_exit(command: String, result: ExecutionResult) -> CommandFailure {
    CommandFailure {
        command,
        kind: FailureKind::NonZeroExit,
        detail: result.status_text(),
        stderr: Some(result.stderr),
    }
}

fn run_error(command: String, e: &RunError) -> CommandFailure {
    CommandFailure {
        command,
        kind: FailureKind::from(e),
        detail: e.to_string(),
        stderr: None,
    }
}

fn interrupted(template: &CommandTemplate) -> CommandFailure {
    CommandFailure {
        command: template.tokens.join(" "),
        kind: FailureKind::Interrupted,
        detail: "interrupted before completion".to_string(),
        stderr: None,
    }
}
