//! rclone-exporter library crate.
//!
//! Probes rclone remotes on demand and republishes the results as Prometheus
//! metrics. The binary wires these modules to an HTTP server; tests drive them
//! directly.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod probe;
pub mod rclone;

pub use error::{Error, Result};
