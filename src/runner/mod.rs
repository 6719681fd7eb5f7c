//! Command execution
//!
//! The harness reaches the system under test only by running processes.
//! [`CommandRunner`] is the seam: [`ProcessRunner`] spawns real processes,
//! tests substitute a scripted implementation.

mod process;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use process::ProcessRunner;

/// A program invocation: program, arguments, working directory and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Build from a token list where the first token is the program
    ///
    /// Returns `None` for an empty list.
    pub fn from_tokens(tokens: Vec<String>) -> Option<Self> {
        let mut iter = tokens.into_iter();
        let program = iter.next()?;
        Some(Self::new(program, iter.collect()))
    }

    /// A script run through `sh -c`
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", vec!["-c".to_string(), script.into()])
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote_token(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote_token(arg))?;
        }
        Ok(())
    }
}

fn quote_token(token: &str) -> String {
    if !token.is_empty()
        && !token
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$' | '`'))
    {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}

/// What a finished process left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable exit status
    pub fn status_text(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Reasons a command produced no [`ExecutionResult`]
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to start '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Timed out after {} seconds; process killed", .0.as_secs())]
    Timeout(Duration),

    #[error("Failed waiting for process: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    pub fn spawn(program: &str, reason: impl fmt::Display) -> Self {
        Self::Spawn {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Executes commands to completion
///
/// Implementations must not leave the process running on any exit path,
/// including when the returned future is dropped.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, waiting at most `timeout` for it to terminate
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<ExecutionResult, RunError>;
}
