//! The supervisor: one execution process per invocation, bounded in time.
//!
//! Lifecycle of an invocation:
//!
//! ```text
//! Launched -> Running -> Completed | TimedOut | Crashed
//! ```
//!
//! Only `Completed` children have their stdout parsed. Every other terminal
//! state produces a synthesized result.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use harness_common::{ExecutionResult, millis};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::loader::STDIN_PATH;
use crate::process::kill_process_group;

/// Default execution budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(DEFAULT_TIMEOUT_MS);

/// How long to keep draining pipes after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How to launch the execution process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub exec_bin: PathBuf,
    /// Placed before the handler reference and payload path.
    pub exec_args: Vec<String>,
    pub timeout: Duration,
}

/// Terminal state of one supervised execution process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited with status 0; stdout was interpreted.
    Completed,
    /// Killed after exceeding the timeout.
    TimedOut,
    /// Died from a signal or exited non-zero.
    Crashed,
    /// Could not be spawned at all.
    LaunchFailed,
}

#[derive(Debug)]
pub struct Supervised {
    pub result: ExecutionResult,
    pub termination: Termination,
    pub pid: Option<u32>,
}

pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Run `handler` against `payload` in a fresh execution process.
    ///
    /// Never fails: launch problems, crashes, timeouts and malformed output
    /// are all folded into the returned result.
    pub async fn run(&self, handler: &str, payload: &Path) -> Supervised {
        let started = Instant::now();
        let stdin = if payload == Path::new(STDIN_PATH) {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut cmd = Command::new(&self.config.exec_bin);
        cmd.args(&self.config.exec_args)
            .arg(handler)
            .arg(payload)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(exec_bin = %self.config.exec_bin.display(), error = %e, "failed to launch execution process");
                let error = format!(
                    "failed to launch execution process {}: {e}",
                    self.config.exec_bin.display()
                );
                return Supervised {
                    result: ExecutionResult::failure(error, String::new(), millis(started.elapsed())),
                    termination: Termination::LaunchFailed,
                    pid: None,
                };
            }
        };
        let pid = child.id();
        debug!(pid, handler, "execution process launched");

        let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(pid, error = %e, "waiting for execution process failed");
                terminate(&mut child, pid).await;
                abort_drain(stdout);
                abort_drain(stderr);
                let error = format!("failed to wait for execution process: {e}");
                return Supervised {
                    result: ExecutionResult::failure(error, String::new(), millis(started.elapsed())),
                    termination: Termination::Crashed,
                    pid,
                };
            }
            Err(_) => {
                warn!(pid, timeout_ms = millis(self.config.timeout), "execution timed out, killing process group");
                terminate(&mut child, pid).await;
                abort_drain(stdout);
                abort_drain(stderr);
                return Supervised {
                    result: ExecutionResult::timed_out(self.config.timeout),
                    termination: Termination::TimedOut,
                    pid,
                };
            }
        };

        // Descendants left behind in the group must not outlive the invocation.
        if let Some(pid) = pid
            && kill_process_group(pid)
        {
            debug!(pid, "killed leftover members of the execution process group");
        }

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let (result, termination) = interpret(status, &stdout, &stderr, millis(started.elapsed()));
        info!(pid, ?termination, %status, duration_ms = result.duration_ms, "execution process finished");
        Supervised {
            result,
            termination,
            pid,
        }
    }
}

/// `SIGKILL` the whole group, then reap the child.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        warn!(pid, error = %e, "failed to reap execution process");
    }
}

async fn drain(mut pipe: impl AsyncRead + Unpin) -> Vec<u8> {
    let mut bytes = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut bytes).await {
        debug!(error = %e, "pipe read failed");
    }
    bytes
}

fn abort_drain(handle: Option<JoinHandle<Vec<u8>>>) {
    if let Some(handle) = handle {
        handle.abort();
    }
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!(error = %e, "pipe reader task failed");
            Vec::new()
        }
        Err(_) => {
            warn!("pipe still open after execution process exited");
            handle.abort();
            Vec::new()
        }
    }
}

/// Turn a finished child's exit status and output into the final result.
fn interpret(
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
    elapsed_ms: u64,
) -> (ExecutionResult, Termination) {
    let stderr = String::from_utf8_lossy(stderr);

    if !status.success() {
        let error = if stderr.trim().is_empty() {
            format!("execution process exited abnormally ({status})")
        } else {
            stderr.into_owned()
        };
        return (
            ExecutionResult::failure(error, String::new(), elapsed_ms),
            Termination::Crashed,
        );
    }

    // The error channel is reserved for sandbox-level failures.
    if !stderr.is_empty() {
        return (
            ExecutionResult::failure(stderr.into_owned(), String::new(), elapsed_ms),
            Termination::Completed,
        );
    }

    let stdout = String::from_utf8_lossy(stdout);
    let result = match ExecutionResult::decode(&stdout) {
        Ok(result) => result,
        Err(e) => ExecutionResult::failure(
            format!("invalid response from execution process ({e}): {stdout}"),
            String::new(),
            elapsed_ms,
        ),
    };
    (result, Termination::Completed)
}
