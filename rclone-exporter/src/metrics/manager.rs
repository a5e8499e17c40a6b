//! Registry lifecycle.
//!
//! Two layouts are supported, selected by [`RegistryMode`]:
//!
//! - [`RegistryMode::Shared`]: one registry for the process lifetime. Each
//!   probe overwrites the series of its own remote; other remotes keep their
//!   last-known values and stay visible on `/metrics`. Every distinct remote
//!   ever probed adds a label value that is never dropped, so memory grows
//!   with the number of remotes.
//! - [`RegistryMode::PerProbe`]: a fresh registry per probe holding only that
//!   probe's series (plus the lifetime counters and build info). Cardinality
//!   stays bounded, but nothing is remembered between probes.
//!
//! In both layouts a probe response only contains series of the probed remote.

use prometheus::{GaugeVec, Registry};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::collector::{BuildInfo, LifetimeCounters, ProbeSeries};
use super::exposition;
use crate::Result;
use crate::rclone::{ProbeResult, RemoteIdentifier};

/// Where probe series live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryMode {
    #[default]
    Shared,
    PerProbe,
}

impl fmt::Display for RegistryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryMode::Shared => write!(f, "shared"),
            RegistryMode::PerProbe => write!(f, "per-probe"),
        }
    }
}

impl FromStr for RegistryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(RegistryMode::Shared),
            "per-probe" | "per_probe" | "perprobe" => Ok(RegistryMode::PerProbe),
            other => Err(format!(
                "unknown registry mode '{other}' (expected 'shared' or 'per-probe')"
            )),
        }
    }
}

/// Owner of the global registry and factory for probe scopes.
pub struct MetricsManager {
    mode: RegistryMode,
    registry: Registry,
    lifetime: LifetimeCounters,
    build_info: GaugeVec,
    shared: Option<ProbeSeries>,
}

impl MetricsManager {
    pub fn new(mode: RegistryMode) -> Result<Self> {
        let registry = Registry::new();

        let lifetime = LifetimeCounters::new()?;
        lifetime.register(&registry)?;

        let build_info = BuildInfo::current().gauge()?;
        registry.register(Box::new(build_info.clone()))?;

        let shared = match mode {
            RegistryMode::Shared => {
                let series = ProbeSeries::new()?;
                series.register(&registry)?;
                Some(series)
            }
            RegistryMode::PerProbe => None,
        };

        Ok(Self {
            mode,
            registry,
            lifetime,
            build_info,
            shared,
        })
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// The long-lived registry served on `/metrics`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn lifetime(&self) -> &LifetimeCounters {
        &self.lifetime
    }

    /// Open the metrics scope of one probe.
    pub fn begin_probe(&self, remote: RemoteIdentifier) -> Result<ProbeScope> {
        match &self.shared {
            Some(series) => Ok(ProbeScope {
                remote,
                series: series.clone(),
                registry: self.registry.clone(),
                ephemeral: None,
            }),
            None => {
                let registry = Registry::new();
                let series = ProbeSeries::new()?;
                series.register(&registry)?;
                self.lifetime.register(&registry)?;
                registry.register(Box::new(self.build_info.clone()))?;
                Ok(ProbeScope {
                    remote,
                    series,
                    registry,
                    ephemeral: Some(self.lifetime.clone()),
                })
            }
        }
    }

    /// Note a probe turned away before it ran.
    ///
    /// Only the shared registry remembers it; a per-probe registry would be
    /// thrown away unserved.
    pub fn record_rejected(&self, remote: &RemoteIdentifier) {
        if let Some(series) = &self.shared {
            series.record_failure(remote);
        }
    }

    /// Encode the global registry.
    pub fn encode_global(&self) -> Result<String> {
        exposition::encode(&self.registry.gather())
    }

    /// Unregister everything from the global registry.
    pub fn close(&self) {
        if let Some(series) = &self.shared {
            series.unregister(&self.registry);
        }
        self.lifetime.unregister(&self.registry);
        if let Err(e) = self.registry.unregister(Box::new(self.build_info.clone())) {
            tracing::debug!(error = %e, "Build info was not registered");
        }
    }
}

/// Metrics of a single probe.
///
/// Writes are atomic per series, so concurrent probes never corrupt each
/// other. Two concurrent probes of the same remote in shared mode race and the
/// last writer wins.
pub struct ProbeScope {
    remote: RemoteIdentifier,
    series: ProbeSeries,
    registry: Registry,
    /// Set for per-probe registries: counters to detach on drop.
    ephemeral: Option<LifetimeCounters>,
}

impl ProbeScope {
    pub fn remote(&self) -> &RemoteIdentifier {
        &self.remote
    }

    pub fn record_success(&self, result: &ProbeResult) {
        self.series.record_success(&self.remote, result);
    }

    pub fn record_failure(&self) {
        self.series.record_failure(&self.remote);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.series.record_duration(&self.remote, duration);
    }

    fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        let families = self.registry.gather();
        match self.ephemeral {
            Some(_) => families,
            None => exposition::retain_remote(families, self.remote.as_str()),
        }
    }

    /// Snapshot in text exposition format.
    pub fn encode(&self) -> Result<String> {
        exposition::encode(&self.gather())
    }

    /// Write the snapshot to `writer`.
    pub fn serve<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        exposition::encode_into(&self.gather(), writer)
    }
}

impl Drop for ProbeScope {
    fn drop(&mut self) {
        if let Some(lifetime) = self.ephemeral.take() {
            self.series.unregister(&self.registry);
            lifetime.unregister(&self.registry);
        }
    }
}
