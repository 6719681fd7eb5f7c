//! Scenario engine
//!
//! Reads YAML test scenarios and drives the system under test through
//! setup, ordered steps and teardown, checking each step's output.

mod config;
mod harness;
mod report;
mod scenario;
mod step;
mod template;
#[cfg(test)]
mod testutil;

pub use config::*;
pub use harness::Harness;
pub use report::{CommandFailure, HarnessReport, RunReport, StepReport};
pub use scenario::{
    CancelHandle, CancelSignal, NoopObserver, RunObserver, RunOptions, RunState, Scenario,
};
pub use step::{trim_trailing_newline, Expectation, Failure, FailureKind, ScenarioStep, StepOutcome};
pub use template::{render, CommandTemplate, TemplateError, Vars};
