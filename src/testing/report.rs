//! Run reports
//!
//! Produced by [`Scenario::run`](super::Scenario::run) and aggregated by the
//! [`Harness`](super::Harness). Serializable so the CLI can emit them as JSON.

use serde::Serialize;

use super::scenario::RunState;
use super::step::{FailureKind, StepOutcome};

/// Outcome of one attempted step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub name: String,
    /// The rendered command line, when rendering succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

impl StepReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }
}

/// A setup or teardown command that did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandFailure {
    pub command: String,
    pub kind: FailureKind,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// Everything that happened during one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub scenario: String,
    /// States visited, in order, ending in `Done`
    pub states: Vec<RunState>,
    /// Set when a setup command failed; no steps were attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_failure: Option<CommandFailure>,
    pub steps: Vec<StepReport>,
    pub steps_total: usize,
    /// Teardown problems; these never fail an otherwise passing run
    pub teardown_warnings: Vec<CommandFailure>,
    pub interrupted: bool,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(scenario: impl Into<String>, steps_total: usize) -> Self {
        Self {
            scenario: scenario.into(),
            states: Vec::new(),
            setup_failure: None,
            steps: Vec::new(),
            steps_total,
            teardown_warnings: Vec::new(),
            interrupted: false,
            elapsed_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.setup_failure.is_none()
            && !self.interrupted
            && self.steps.len() == self.steps_total
            && self.steps.iter().all(StepReport::passed)
    }

    pub fn steps_passed(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    /// The step that stopped the run, if any
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| !s.passed())
    }
}

/// Aggregate over every scenario in a harness run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    pub passed: bool,
    pub interrupted: bool,
    pub scenarios: Vec<RunReport>,
    /// Scenarios never started because the run was interrupted
    pub skipped: Vec<String>,
}

impl HarnessReport {
    pub fn new(scenarios: Vec<RunReport>, skipped: Vec<String>, interrupted: bool) -> Self {
        let passed = !interrupted && skipped.is_empty() && scenarios.iter().all(RunReport::passed);
        Self {
            passed,
            interrupted,
            scenarios,
            skipped,
        }
    }

    /// Process exit code: 0 when everything passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|r| !r.passed()).count()
    }
}
