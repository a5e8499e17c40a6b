//! Metrics registry management.
//!
//! Owns the Prometheus registries the exporter serves:
//!
//! - Probe series (size, object count, success, duration, probe info) keyed by remote
//! - Lifetime counters (probe requests, probe errors)
//! - Build info
//!
//! # Example
//!
//! ```ignore
//! use rclone_exporter::metrics::{MetricsManager, RegistryMode};
//!
//! let manager = MetricsManager::new(RegistryMode::Shared)?;
//! let scope = manager.begin_probe(remote)?;
//! scope.record_success(&result);
//! let body = scope.encode()?;
//! ```

mod collector;
mod exposition;
mod manager;

pub use collector::{BuildInfo, LifetimeCounters, ProbeSeries};
pub use exposition::{CONTENT_TYPE, encode, retain_remote};
pub use manager::{MetricsManager, ProbeScope, RegistryMode};
