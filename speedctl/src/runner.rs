//! Bounded execution of the external measurement tools.
//!
//! A run captures all of stdout and succeeds only on exit status 0. The child is killed and
//! reaped when the deadline expires or the cancellation token fires, whichever comes first.
//! There are no retries here; a failed run waits for the next scheduler tick.

use crate::errors::{Error, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Seam between the orchestrator and real processes, so schedules can be tested with canned output.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning captured stdout on a zero exit status.
    async fn run(&self, program: &str, args: &[String], deadline: Duration, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Runs commands as tokio child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Interrupted(Interrupt),
}

/// Why a run was stopped before its output was complete.
enum Interrupt {
    Deadline,
    Cancelled,
}

impl Interrupt {
    fn into_error(self, program: &str, deadline: Duration) -> Error {
        match self {
            Interrupt::Deadline => Error::ProcessTimeout {
                command: program.to_string(),
                deadline,
            },
            Interrupt::Cancelled => Error::ProcessExecutionFailed {
                command: program.to_string(),
                detail: "cancelled".to_string(),
                stderr: None,
            },
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String], deadline: Duration, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::ProcessExecutionFailed {
            command: program.to_string(),
            detail: format!("failed to spawn: {e}"),
            stderr: None,
        })?;

        debug!(command = %program, pid = ?child.id(), deadline_secs = deadline.as_secs(), "Spawned tool process");

        let expires_at = Instant::now() + deadline;

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe
        let mut stdout = drain(child.stdout.take());
        let mut stderr = drain(child.stderr.take());

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep_until(expires_at) => Outcome::Interrupted(Interrupt::Deadline),
            _ = cancel.cancelled() => Outcome::Interrupted(Interrupt::Cancelled),
        };

        let status = match outcome {
            Outcome::Exited(Ok(status)) => status,
            Outcome::Exited(Err(e)) => {
                stdout.abort();
                stderr.abort();
                return Err(Error::ProcessExecutionFailed {
                    command: program.to_string(),
                    detail: format!("failed to wait for process: {e}"),
                    stderr: None,
                });
            }
            Outcome::Interrupted(interrupt) => {
                kill_and_reap(&mut child, program).await;
                stdout.abort();
                stderr.abort();
                return Err(interrupt.into_error(program, deadline));
            }
        };

        // A descendant of the tool can keep the pipes open after the tool itself exited,
        // so reading them is bound by the same deadline
        let drained = tokio::select! {
            output = async { (collect(&mut stdout).await, collect(&mut stderr).await) } => Ok(output),
            _ = tokio::time::sleep_until(expires_at) => Err(Interrupt::Deadline),
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        };

        let (stdout, stderr) = match drained {
            Ok(output) => output,
            Err(interrupt) => {
                warn!(command = %program, "Tool exited but its output pipes stayed open");
                stdout.abort();
                stderr.abort();
                return Err(interrupt.into_error(program, deadline));
            }
        };

        if status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            Err(Error::ProcessExecutionFailed {
                command: program.to_string(),
                detail: format!("exited with {status}"),
                stderr: (!stderr.is_empty()).then_some(stderr),
            })
        }
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buf).await
        {
            debug!(error = %e, "Failed to read tool output");
        }
        buf
    })
}

async fn collect(handle: &mut JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.await.unwrap_or_default()
}

/// `Child::kill` sends SIGKILL and then waits, so the process is reaped on return.
async fn kill_and_reap(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!(command = %program, error = %e, "Failed to kill tool process");
    }
}
