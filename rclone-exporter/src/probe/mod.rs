//! On-demand probes of rclone remotes.
//!
//! A probe validates the requested remote, takes one of a fixed number of
//! permits, runs `rclone size`, and turns the outcome into a metrics snapshot.

mod orchestrator;

pub use orchestrator::{DEFAULT_MAX_CONCURRENT_PROBES, ProbeOrchestrator};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::rclone::{InvalidRemote, ParseError, ProbeResult, RemoteIdentifier};

/// Measures one remote.
///
/// Implemented by [`crate::rclone::RcloneClient`]; tests substitute fakes.
#[async_trait]
pub trait SizeProbe: Send + Sync {
    async fn probe(&self, remote: &RemoteIdentifier) -> Result<ProbeResult, ProbeError>;
}

/// Why a probe did not produce a snapshot.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Invalid remote parameter: {0}")]
    InvalidInput(#[from] InvalidRemote),

    #[error("Too many concurrent requests")]
    Throttled,

    #[error("rclone probe timed out after {elapsed:.2?} (timeout {timeout:?})")]
    ExecutionTimeout { elapsed: Duration, timeout: Duration },

    #[error("rclone probe failed: {detail}")]
    ExecutionFailure { code: Option<i32>, detail: String },

    #[error("rclone returned unusable output: {0}")]
    DataError(#[from] ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    /// Short category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InvalidInput(_) => "invalid_input",
            ProbeError::Throttled => "throttled",
            ProbeError::ExecutionTimeout { .. } => "timeout",
            ProbeError::ExecutionFailure { .. } => "execution_failure",
            ProbeError::DataError(_) => "data_error",
            ProbeError::Internal(_) => "internal",
        }
    }
}

impl From<process_utils::RunError> for ProbeError {
    fn from(err: process_utils::RunError) -> Self {
        use process_utils::RunError;

        match err {
            RunError::Timeout { elapsed, timeout } => {
                ProbeError::ExecutionTimeout { elapsed, timeout }
            }
            RunError::NonZeroExit { code, output } => ProbeError::ExecutionFailure {
                code: Some(code),
                detail: format!("exit code {code}: {output}"),
            },
            err @ (RunError::Launch { .. } | RunError::Wait { .. }) => {
                ProbeError::ExecutionFailure {
                    code: None,
                    detail: err.to_string(),
                }
            }
        }
    }
}
