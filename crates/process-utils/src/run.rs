//! Captured process execution under a hard deadline.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::tokio_command;

/// Failure modes of [`run_captured`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {elapsed:.2?} (limit {timeout:?})")]
    Timeout { elapsed: Duration, timeout: Duration },

    #[error("command exited with code {code}: {output}")]
    NonZeroExit { code: i32, output: String },

    #[error("failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Output of a process that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl CapturedOutput {
    /// Standard output followed by standard error, lossily decoded.
    pub fn merged(&self) -> String {
        merge_streams(&self.stdout, &self.stderr)
    }
}

fn merge_streams(stdout: &[u8], stderr: &[u8]) -> String {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    match (out.trim(), err.trim()) {
        ("", err) => err.to_owned(),
        (out, "") => out.to_owned(),
        (out, err) => format!("{out}\n{err}"),
    }
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader
            && let Err(e) = reader.read_to_end(&mut buf).await
        {
            debug!(error = %e, "Stopped reading child output");
        }
        buf
    })
}

/// Run `program` with `args`, capturing both output streams.
///
/// The deadline covers the whole run including draining the pipes. When it
/// expires the child is killed and reaped before returning
/// [`RunError::Timeout`]. The child is also spawned with `kill_on_drop`, so
/// dropping the returned future never leaves a process behind.
pub async fn run_captured<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<CapturedOutput, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio_command(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let deadline = start + timeout;

    let mut child = cmd.spawn().map_err(|source| RunError::Launch {
        program: program.to_owned(),
        source,
    })?;

    let mut stdout_task = drain(child.stdout.take());
    let mut stderr_task = drain(child.stderr.take());

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::Wait {
                program: program.to_owned(),
                source,
            });
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(program, error = %e, "Failed to kill timed out process");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::Timeout {
                elapsed: start.elapsed(),
                timeout,
            });
        }
    };

    // A grandchild can keep the pipes open after the direct child exits.
    let drained = tokio::time::timeout_at(deadline, async {
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (stdout, stderr)
    })
    .await;

    let (stdout, stderr) = match drained {
        Ok(streams) => streams,
        Err(_) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::Timeout {
                elapsed: start.elapsed(),
                timeout,
            });
        }
    };

    if !status.success() {
        return Err(RunError::NonZeroExit {
            code: status.code().unwrap_or(-1),
            output: merge_streams(&stdout, &stderr),
        });
    }

    Ok(CapturedOutput {
        stdout,
        stderr,
        elapsed: start.elapsed(),
    })
}
