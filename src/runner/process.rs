//! Runs commands as real OS processes

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tokio::task::JoinHandle;

use super::{CommandRunner, CommandSpec, ExecutionResult, RunError};

/// How long to keep reading output after the process exited.
///
/// A process that daemonizes (e.g. `dfx start --background`) can leave a
/// child holding the pipes open; we stop waiting for EOF after this.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// [`CommandRunner`] backed by `tokio::process`
///
/// Each child runs in its own process group. If the run ends without the
/// process having exited (timeout, or the future being dropped) the whole
/// group is killed.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<ExecutionResult, RunError> {
        let program = resolve_program(command)?;
        tracing::debug!(command = %command, program = %program.display(), "Spawning process");

        let mut cmd = TokioCommand::new(&program);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }
        for (key, value) in command.env() {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| RunError::spawn(command.program(), e))?;
        let mut group = ProcessGroupGuard::new(child.id());

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!(command = %command, timeout_secs = timeout.as_secs(), "Process timed out");
                // Guard drop kills the group, child drop reaps
                return Err(RunError::Timeout(timeout));
            }
        };
        group.disarm();

        let stdout = stdout.collect().await;
        let stderr = stderr.collect().await;
        let elapsed = started.elapsed();

        tracing::debug!(
            command = %command,
            exit_code = ?status.code(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Process finished"
        );

        Ok(ExecutionResult {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed,
        })
    }
}

/// Locate the program the way the OS would, relative to the command's working directory
fn resolve_program(command: &CommandSpec) -> Result<PathBuf, RunError> {
    let cwd = match command.working_dir() {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    if let Some(dir) = command.working_dir() {
        if !dir.is_dir() {
            return Err(RunError::spawn(
                command.program(),
                format!("working directory '{}' does not exist", dir.display()),
            ));
        }
    }

    // An explicit PATH override in the step's environment wins
    let path_var = command
        .env()
        .iter()
        .rev()
        .find(|(key, _)| key == "PATH")
        .map(|(_, value)| std::ffi::OsString::from(value))
        .or_else(|| std::env::var_os("PATH"));

    which::which_in(command.program(), path_var, &cwd)
        .map_err(|_| RunError::spawn(command.program(), "program not found"))
}

/// Output pipe being drained in the background
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

fn spawn_reader<R>(pipe: Option<R>) -> PipeReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let handle = pipe.map(|mut pipe| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        })
    });
    PipeReader { buffer, handle }
}

impl PipeReader {
    /// Wait briefly for EOF, then take whatever was read
    async fn collect(mut self) -> String {
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await.is_err() {
                tracing::debug!("Output pipe still open after exit, likely held by a background process");
                handle.abort();
            }
        }
        let bytes = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Kills the child's process group when dropped while armed
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    tracing::debug!(pgid = pid, "Killing process group");
    // The group id equals the leader's pid because of process_group(0)
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        tracing::debug!(
            pgid = pid,
            error = %std::io::Error::last_os_error(),
            "Process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {
    // kill_on_drop terminates the direct child
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::shell(script)
    }

    #[tokio::test]
    async fn test_captures_stdout_stderr_and_exit_code() {
        let runner = ProcessRunner::new();
        let result = runner
            .run(&sh("echo out; echo err >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = ProcessRunner::new();
        let cmd = CommandSpec::new("definitely-not-a-real-program-4242", Vec::new());
        let err = runner.run(&cmd, Duration::from_secs(5)).await.unwrap_err();
        match err {
            RunError::Spawn { program, .. } => {
                assert_eq!(program, "definitely-not-a-real-program-4242")
            }
            other => panic!("Expected Spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let err = runner
            .run(&sh("sleep 30"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_working_dir_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new();
        let cmd = sh("pwd; echo \"$GAME\"")
            .with_working_dir(dir.path())
            .with_env("GAME", "test");
        let result = runner.run(&cmd, Duration::from_secs(10)).await.unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let mut lines = result.stdout.lines();
        assert_eq!(
            PathBuf::from(lines.next().unwrap()).canonicalize().unwrap(),
            canonical
        );
        assert_eq!(lines.next(), Some("test"));
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_spawn_error() {
        let runner = ProcessRunner::new();
        let cmd = sh("true").with_working_dir("/nonexistent/harness/dir");
        let err = runner.run(&cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_background_child_does_not_block_output() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let result = runner
            .run(&sh("sleep 5 & echo started"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
