//! Metric instruments.
//!
//! Instruments are cheap handles around shared atomics: cloning one and
//! registering the clone in a second registry exposes the same values twice.
//! The per-probe registry relies on this for the lifetime counters.

use prometheus::{GaugeVec, IntCounter, Opts, Registry};
use std::time::Duration;
use tracing::debug;

use crate::rclone::{ProbeResult, RemoteIdentifier};

pub const SIZE_BYTES: &str = "rclone_remote_size_bytes";
pub const OBJECTS_COUNT: &str = "rclone_remote_objects_count";
pub const PROBE_SUCCESS: &str = "rclone_probe_success";
pub const PROBE_DURATION_SECONDS: &str = "rclone_probe_duration_seconds";
pub const PROBE_INFO: &str = "rclone_probe_info";
pub const PROBE_REQUESTS_TOTAL: &str = "rclone_exporter_probe_requests_total";
pub const SCRAPE_ERRORS_TOTAL: &str = "rclone_exporter_scrape_errors_total";
pub const BUILD_INFO: &str = "rclone_exporter_build_info";

/// Label carrying the remote identifier on every per-probe series.
pub const REMOTE_LABEL: &str = "remote";

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(name, help), labels)
}

fn unregister_logged(registry: &Registry, collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = registry.unregister(collector) {
        debug!(error = %e, "Collector was not registered");
    }
}

/// Gauges describing the outcome of a probe, keyed by remote.
#[derive(Clone)]
pub struct ProbeSeries {
    size_bytes: GaugeVec,
    objects_count: GaugeVec,
    success: GaugeVec,
    duration_seconds: GaugeVec,
    info: GaugeVec,
}

impl ProbeSeries {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            size_bytes: gauge_vec(
                SIZE_BYTES,
                "Total size of the rclone remote in bytes.",
                &[REMOTE_LABEL],
            )?,
            objects_count: gauge_vec(
                OBJECTS_COUNT,
                "Total number of objects in the rclone remote.",
                &[REMOTE_LABEL],
            )?,
            success: gauge_vec(
                PROBE_SUCCESS,
                "1 if the last rclone probe was successful, 0 otherwise.",
                &[REMOTE_LABEL],
            )?,
            duration_seconds: gauge_vec(
                PROBE_DURATION_SECONDS,
                "Duration of the rclone size probe in seconds.",
                &[REMOTE_LABEL],
            )?,
            info: gauge_vec(
                PROBE_INFO,
                "Probed remote, decomposed into remote name and path.",
                &[REMOTE_LABEL, "name", "path"],
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.size_bytes.clone()))?;
        registry.register(Box::new(self.objects_count.clone()))?;
        registry.register(Box::new(self.success.clone()))?;
        registry.register(Box::new(self.duration_seconds.clone()))?;
        registry.register(Box::new(self.info.clone()))?;
        Ok(())
    }

    pub fn unregister(&self, registry: &Registry) {
        unregister_logged(registry, Box::new(self.size_bytes.clone()));
        unregister_logged(registry, Box::new(self.objects_count.clone()));
        unregister_logged(registry, Box::new(self.success.clone()));
        unregister_logged(registry, Box::new(self.duration_seconds.clone()));
        unregister_logged(registry, Box::new(self.info.clone()));
    }

    fn mark(&self, remote: &RemoteIdentifier) {
        self.info
            .with_label_values(&[remote.as_str(), remote.name(), remote.path()])
            .set(1.0);
    }

    pub fn record_success(&self, remote: &RemoteIdentifier, result: &ProbeResult) {
        let label = [remote.as_str()];
        self.size_bytes
            .with_label_values(&label)
            .set(result.total_bytes as f64);
        self.objects_count
            .with_label_values(&label)
            .set(result.object_count as f64);
        self.success.with_label_values(&label).set(1.0);
        self.mark(remote);
    }

    /// Only the success flag changes; size and count keep their last values.
    pub fn record_failure(&self, remote: &RemoteIdentifier) {
        self.success.with_label_values(&[remote.as_str()]).set(0.0);
        self.mark(remote);
    }

    pub fn record_duration(&self, remote: &RemoteIdentifier, duration: Duration) {
        self.duration_seconds
            .with_label_values(&[remote.as_str()])
            .set(duration.as_secs_f64());
    }
}

/// Process-wide counters that survive every probe.
#[derive(Clone)]
pub struct LifetimeCounters {
    probe_requests_total: IntCounter,
    scrape_errors_total: IntCounter,
}

impl LifetimeCounters {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            probe_requests_total: IntCounter::new(
                PROBE_REQUESTS_TOTAL,
                "Total number of probe requests received.",
            )?,
            scrape_errors_total: IntCounter::new(
                SCRAPE_ERRORS_TOTAL,
                "Total number of rclone probe errors.",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.probe_requests_total.clone()))?;
        registry.register(Box::new(self.scrape_errors_total.clone()))?;
        Ok(())
    }

    pub fn unregister(&self, registry: &Registry) {
        unregister_logged(registry, Box::new(self.probe_requests_total.clone()));
        unregister_logged(registry, Box::new(self.scrape_errors_total.clone()));
    }

    pub fn record_request(&self) {
        self.probe_requests_total.inc();
    }

    pub fn record_error(&self) {
        self.scrape_errors_total.inc();
    }

    pub fn requests(&self) -> u64 {
        self.probe_requests_total.get()
    }

    pub fn errors(&self) -> u64 {
        self.scrape_errors_total.get()
    }
}

/// Build metadata baked in at compile time.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_date: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: match option_env!("RCLONE_EXPORTER_COMMIT") {
                Some(commit) => commit,
                None => "unknown",
            },
            build_date: match option_env!("RCLONE_EXPORTER_BUILD_DATE") {
                Some(date) => date,
                None => "unknown",
            },
        }
    }

    /// Constant `1` gauge labeled with the build metadata.
    pub fn gauge(&self) -> prometheus::Result<GaugeVec> {
        let gauge = gauge_vec(
            BUILD_INFO,
            "Build information about the rclone exporter including version, commit, and build date.",
            &["version", "commit", "build_date"],
        )?;
        gauge
            .with_label_values(&[self.version, self.commit, self.build_date])
            .set(1.0);
        Ok(gauge)
    }
}
