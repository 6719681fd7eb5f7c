//! A single scenario step and its evaluation

use std::time::Duration;

use serde::Serialize;

use crate::runner::{CommandRunner, RunError};

use super::template::{CommandTemplate, Vars};

/// How a step's output is judged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "text", rename_all = "snake_case")]
pub enum Expectation {
    /// Byte-exact equality after trimming one trailing newline
    Equals(String),
    /// Output contains the text
    Contains(String),
}

impl Expectation {
    pub fn matches(&self, output: &str) -> bool {
        let output = trim_trailing_newline(output);
        match self {
            Self::Equals(expected) => output == expected,
            Self::Contains(needle) => output.contains(needle.as_str()),
        }
    }

    /// The expected text, for reports
    pub fn text(&self) -> &str {
        match self {
            Self::Equals(text) | Self::Contains(text) => text,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Equals(text) => format!("equals {:?}", text),
            Self::Contains(text) => format!("contains {:?}", text),
        }
    }
}

/// Strip a single trailing `\n` (or `\r\n`), nothing more
pub fn trim_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Failure taxonomy shared by steps and setup/teardown commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The process could not be started
    SpawnError,
    /// The process ran but exited unsuccessfully
    NonZeroExit,
    /// The process succeeded but printed something else
    OutputMismatch,
    /// The process did not finish in time and was killed
    TimeoutExceeded,
    /// The process started but waiting on it or reading its output failed
    ProcessError,
    /// A placeholder had no value, nothing was run
    Template,
    /// The run was cancelled by the operator
    Interrupted,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::SpawnError => "spawn error",
            Self::NonZeroExit => "non-zero exit",
            Self::OutputMismatch => "output mismatch",
            Self::TimeoutExceeded => "timeout exceeded",
            Self::ProcessError => "process error",
            Self::Template => "template error",
            Self::Interrupted => "interrupted",
        }
    }
}

impl From<&RunError> for FailureKind {
    fn from(e: &RunError) -> Self {
        match e {
            RunError::Spawn { .. } => Self::SpawnError,
            RunError::Io(_) => Self::ProcessError,
            RunError::Timeout(_) => Self::TimeoutExceeded,
        }
    }
}

/// Why a step failed. Always carries both sides of the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub expected: String,
    pub actual: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            kind,
            expected: expected.into(),
            actual: actual.into(),
            exit_code: None,
            stderr: None,
        }
    }

    pub fn interrupted(expected: impl Into<String>) -> Self {
        Self::new(FailureKind::Interrupted, expected, "interrupted before completion")
    }
}

/// Result of evaluating one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Pass,
    Fail(Failure),
}

impl StepOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Pass => None,
            Self::Fail(failure) => Some(failure),
        }
    }
}

/// A named step: one command and what it must print
#[derive(Debug, Clone)]
pub struct ScenarioStep {
    pub name: String,
    pub command: CommandTemplate,
    pub expect: Expectation,
}

impl ScenarioStep {
    pub fn new(name: impl Into<String>, command: CommandTemplate, expect: Expectation) -> Self {
        Self {
            name: name.into(),
            command,
            expect,
        }
    }

    /// Run the step's command once and judge its output. Never retries.
    ///
    /// `default_timeout` applies unless the command carries its own.
    pub async fn evaluate(
        &self,
        runner: &dyn CommandRunner,
        vars: &Vars,
        default_timeout: Duration,
    ) -> StepOutcome {
        let expected = self.expect.text();

        let command = match self.command.render(vars) {
            Ok(command) => command,
            Err(e) => {
                return StepOutcome::Fail(Failure::new(FailureKind::Template, expected, e.to_string()))
            }
        };

        let timeout = self.command.timeout.unwrap_or(default_timeout);
        let result = match runner.run(&command, timeout).await {
            Ok(result) => result,
            Err(e) => {
                return StepOutcome::Fail(Failure::new(FailureKind::from(&e), expected, e.to_string()))
            }
        };

        let actual = trim_trailing_newline(&result.stdout);

        if !result.success() {
            return StepOutcome::Fail(Failure {
                kind: FailureKind::NonZeroExit,
                expected: expected.to_string(),
                actual: actual.to_string(),
                exit_code: result.exit_code,
                stderr: Some(result.stderr),
            });
        }

        if self.expect.matches(&result.stdout) {
            StepOutcome::Pass
        } else {
            StepOutcome::Fail(Failure::new(FailureKind::OutputMismatch, expected, actual))
        }
    }
}
