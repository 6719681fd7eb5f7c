//! Scenario Harness - scripted integration tests for external services
//!
//! This library runs YAML-defined scenarios: setup commands, ordered steps
//! whose standard output must match exactly, and teardown commands that run
//! no matter how the steps went.

pub mod cli;
pub mod commands;
pub mod common;
pub mod runner;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use runner::{CommandRunner, CommandSpec, ExecutionResult, ProcessRunner, RunError};
pub use testing::{Harness, RunReport, Scenario, ScenarioStep, StepOutcome};
