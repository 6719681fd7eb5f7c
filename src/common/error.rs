//! Error types for the harness
//!
//! These cover loading and configuration problems. Failures that happen while
//! a scenario runs never surface here: they are folded into the run report
//! (see [`crate::testing::FailureKind`]).

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Scenario Errors ===
    #[error("Invalid scenario '{path}': {message}")]
    ScenarioParse { path: String, message: String },

    #[error("No scenario files found in '{0}'")]
    NoScenarios(String),

    #[error("Invalid variable '{0}'. Expected KEY=VALUE")]
    InvalidVariable(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a scenario parse error for the file at `path`
    pub fn scenario_parse(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }
}
