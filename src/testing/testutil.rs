//! Scripted [`CommandRunner`] for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::runner::{CommandRunner, CommandSpec, ExecutionResult, RunError};

/// Canned reply for one command
#[derive(Debug, Clone)]
pub enum Response {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    SpawnFailure,
    /// Started, then waiting on it failed
    WaitFailure,
    /// Never completes
    Hang,
}

impl Response {
    pub fn ok(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }

    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        Self::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

/// Replies to commands in order; once the script runs out every command succeeds silently
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Response>>,
    calls: Mutex<Vec<CommandSpec>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<Response>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Programs and arguments of every call, joined for easy assertions
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<ExecutionResult, RunError> {
        self.calls.lock().unwrap().push(command.clone());
        self.timeouts.lock().unwrap().push(timeout);
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Response::ok(""));

        match response {
            Response::Exit {
                code,
                stdout,
                stderr,
            } => Ok(ExecutionResult {
                exit_code: Some(code),
                stdout,
                stderr,
                elapsed: Duration::from_millis(1),
            }),
            Response::Timeout => Err(RunError::Timeout(timeout)),
            Response::SpawnFailure => Err(RunError::spawn(command.program(), "program not found")),
            Response::WaitFailure => Err(RunError::Io(std::io::Error::other("pipe closed"))),
            Response::Hang => std::future::pending().await,
        }
    }
}
