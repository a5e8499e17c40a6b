//! Probe request handling.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::{ProbeError, SizeProbe};
use crate::metrics::{MetricsManager, ProbeScope};
use crate::rclone::RemoteIdentifier;

/// Default size of the probe permit pool.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 10;

/// Holds a permit for the duration of a running probe.
///
/// Dropping it records the elapsed time into the duration gauge and then
/// releases the permit, on every exit path including cancellation.
struct ProbeGuard<'a> {
    scope: &'a ProbeScope,
    start: Instant,
    _permit: OwnedSemaphorePermit,
}

impl<'a> ProbeGuard<'a> {
    fn new(scope: &'a ProbeScope, permit: OwnedSemaphorePermit) -> Self {
        Self {
            scope,
            start: Instant::now(),
            _permit: permit,
        }
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.scope.record_duration(elapsed);
        debug!(
            remote = %self.scope.remote(),
            duration_seconds = elapsed.as_secs_f64(),
            "Probe completed"
        );
    }
}

/// Ties validation, admission control, execution and metrics together.
pub struct ProbeOrchestrator {
    probe: Arc<dyn SizeProbe>,
    metrics: Arc<MetricsManager>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ProbeOrchestrator {
    pub fn new(
        probe: Arc<dyn SizeProbe>,
        metrics: Arc<MetricsManager>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            probe,
            metrics,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsManager> {
        &self.metrics
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits not currently held by a running probe.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one probe and return the snapshot in text exposition format.
    ///
    /// Never waits for a permit: when the pool is exhausted the probe fails
    /// with [`ProbeError::Throttled`].
    pub async fn run(&self, raw_remote: Option<&str>) -> Result<String, ProbeError> {
        let lifetime = self.metrics.lifetime();
        lifetime.record_request();

        let remote = match RemoteIdentifier::parse(raw_remote.unwrap_or_default()) {
            Ok(remote) => remote,
            Err(e) => {
                lifetime.record_error();
                return Err(e.into());
            }
        };

        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            lifetime.record_error();
            self.metrics.record_rejected(&remote);
            return Err(ProbeError::Throttled);
        };

        let scope = match self.metrics.begin_probe(remote.clone()) {
            Ok(scope) => scope,
            Err(e) => {
                lifetime.record_error();
                return Err(ProbeError::Internal(e.to_string()));
            }
        };

        let guard = ProbeGuard::new(&scope, permit);
        debug!(remote = %remote, "Starting rclone probe");

        let outcome = self.probe.probe(&remote).await;
        match &outcome {
            Ok(result) => {
                scope.record_success(result);
                debug!(
                    remote = %remote,
                    bytes = result.total_bytes,
                    objects = result.object_count,
                    "Probe successful"
                );
            }
            Err(_) => {
                scope.record_failure();
                lifetime.record_error();
            }
        }
        drop(guard);

        outcome?;
        scope
            .encode()
            .map_err(|e| ProbeError::Internal(format!("failed to encode metrics: {e}")))
    }

    /// Like [`run`](Self::run), but on a task of its own.
    ///
    /// Dropping the returned future (client gone) does not cancel the probe;
    /// the child process is still bounded by the rclone timeout.
    pub async fn run_detached(
        self: &Arc<Self>,
        raw_remote: Option<String>,
    ) -> Result<String, ProbeError> {
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.run(raw_remote.as_deref()).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.lifetime().record_error();
                Err(ProbeError::Internal(format!("probe task failed: {e}")))
            }
        }
    }
}
