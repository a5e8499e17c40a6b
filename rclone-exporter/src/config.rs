//! Command-line and environment configuration.
//!
//! Every flag can also be set through an `RC_EXPORTER_*` environment
//! variable. Values are parsed once at startup and handed to constructors;
//! nothing below `main` reads the environment.

use clap::{Args, Parser};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::metrics::RegistryMode;
use crate::probe::DEFAULT_MAX_CONCURRENT_PROBES;
use crate::rclone::{DEFAULT_RCLONE_PATH, DEFAULT_TIMEOUT};
use crate::{Error, Result};

pub const DEFAULT_LISTEN_ADDRESS: &str = ":9116";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_PROBE_PATH: &str = "/probe";
pub const DEFAULT_HEALTH_PATH: &str = "/health";
pub const DEFAULT_REMOTES_PATH: &str = "/remotes";
pub const DEFAULT_CONFIG_PATH: &str = "/config";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exporter configuration.
#[derive(Parser, Debug, Clone, Serialize)]
#[command(
    name = "rclone_exporter",
    about = "Prometheus exporter for rclone remotes",
    version
)]
pub struct Config {
    /// Address to listen on. A bare `:port` listens on all interfaces.
    #[arg(
        long = "web.listen-address",
        env = "RC_EXPORTER_LISTEN",
        default_value = DEFAULT_LISTEN_ADDRESS
    )]
    pub listen_address: String,

    /// Path to expose the exporter's own metrics.
    #[arg(
        long = "web.telemetry-path",
        env = "RC_EXPORTER_METRICS",
        default_value = DEFAULT_METRICS_PATH
    )]
    pub telemetry_path: String,

    /// Path to expose the probe endpoint.
    #[arg(
        long = "web.probe-path",
        env = "RC_EXPORTER_PROBE",
        default_value = DEFAULT_PROBE_PATH
    )]
    pub probe_path: String,

    /// Path to expose the health check endpoint.
    #[arg(
        long = "web.health-path",
        env = "RC_EXPORTER_HEALTH",
        default_value = DEFAULT_HEALTH_PATH
    )]
    pub health_path: String,

    /// Path to expose the remotes listing.
    #[arg(
        long = "web.remotes-path",
        env = "RC_EXPORTER_REMOTES",
        default_value = DEFAULT_REMOTES_PATH
    )]
    pub remotes_path: String,

    /// Path to expose the configuration endpoint.
    #[arg(
        long = "web.config-path",
        env = "RC_EXPORTER_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config_path: String,

    /// Path to the rclone binary.
    #[arg(
        long = "rclone.path",
        env = "RC_EXPORTER_RCLONE_BIN",
        default_value = DEFAULT_RCLONE_PATH
    )]
    pub rclone_path: String,

    /// Timeout for a single rclone command (e.g. `90s`, `2m`).
    #[arg(
        long = "rclone.timeout",
        env = "RC_EXPORTER_RCLONE_TIMEOUT",
        default_value = "2m",
        value_parser = humantime::parse_duration
    )]
    #[serde(with = "human_duration")]
    pub rclone_timeout: Duration,

    /// Maximum number of probes running at once; further probes get 429.
    #[arg(
        long = "probe.max-concurrent",
        env = "RC_EXPORTER_MAX_CONCURRENT",
        default_value_t = DEFAULT_MAX_CONCURRENT_PROBES
    )]
    pub max_concurrent: usize,

    /// Registry layout for probe series: `shared` or `per-probe`.
    #[arg(
        long = "probe.registry",
        env = "RC_EXPORTER_REGISTRY",
        default_value_t = RegistryMode::Shared
    )]
    pub registry_mode: RegistryMode,

    /// Timeout for graceful server shutdown.
    #[arg(
        long = "server.shutdown-timeout",
        env = "RC_EXPORTER_SHUTDOWN_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    #[serde(with = "human_duration")]
    pub shutdown_timeout: Duration,

    #[command(flatten)]
    #[serde(skip)]
    pub log: LogConfig,
}

/// Logging flags.
#[derive(Args, Debug, Clone, Default)]
pub struct LogConfig {
    /// Human-readable log output instead of JSON lines.
    #[arg(long = "log.pretty", env = "RC_EXPORTER_LOG_PRETTY")]
    pub pretty: bool,

    /// Enable debug-level logging.
    #[arg(long = "log.debug", env = "RC_EXPORTER_LOG_DEBUG")]
    pub debug: bool,

    /// Enable trace-level logging (most verbose).
    #[arg(long = "log.trace", env = "RC_EXPORTER_LOG_TRACE")]
    pub trace: bool,

    /// Only log warnings and errors.
    #[arg(long = "log.warn", env = "RC_EXPORTER_LOG_WARN")]
    pub warn: bool,

    /// Only log errors.
    #[arg(long = "log.error", env = "RC_EXPORTER_LOG_ERROR")]
    pub error: bool,

    /// Also write logs to this file.
    #[arg(long = "log.file", env = "RC_EXPORTER_LOG_FILE")]
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Most verbose level requested; info when no level flag is set.
    pub fn level(&self) -> tracing::Level {
        if self.trace {
            tracing::Level::TRACE
        } else if self.debug {
            tracing::Level::DEBUG
        } else if self.warn {
            tracing::Level::WARN
        } else if self.error {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            telemetry_path: DEFAULT_METRICS_PATH.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            remotes_path: DEFAULT_REMOTES_PATH.to_string(),
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            rclone_path: DEFAULT_RCLONE_PATH.to_string(),
            rclone_timeout: DEFAULT_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_PROBES,
            registry_mode: RegistryMode::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Address handed to the listener. `:9116` becomes `0.0.0.0:9116`.
    pub fn bind_address(&self) -> String {
        let address = self.listen_address.trim();
        match address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        }
    }

    /// Endpoint paths in a fixed order: metrics, probe, health, remotes, config.
    pub fn endpoint_paths(&self) -> [(&'static str, &str); 5] {
        [
            ("metrics", self.telemetry_path.as_str()),
            ("probe", self.probe_path.as_str()),
            ("health", self.health_path.as_str()),
            ("remotes", self.remotes_path.as_str()),
            ("config", self.config_path.as_str()),
        ]
    }

    /// Reject values the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        let bind = self.bind_address();
        let port = bind
            .rsplit_once(':')
            .map(|(_, port)| port)
            .ok_or_else(|| Error::config(format!("listen address '{bind}' has no port")))?;
        port.parse::<u16>().map_err(|_| {
            Error::config(format!("listen address '{bind}' has an invalid port '{port}'"))
        })?;

        if self.rclone_path.trim().is_empty() {
            return Err(Error::config("rclone path must not be empty"));
        }
        if self.rclone_timeout.is_zero() {
            return Err(Error::config("rclone timeout must be greater than zero"));
        }
        if self.max_concurrent == 0 {
            return Err(Error::config("probe.max-concurrent must be at least 1"));
        }

        let paths = self.endpoint_paths();
        for (name, path) in paths {
            if !path.starts_with('/') {
                return Err(Error::config(format!(
                    "{name} path '{path}' must start with '/'"
                )));
            }
            if path == "/" {
                return Err(Error::config(format!(
                    "{name} path must not be '/' (reserved for the landing page)"
                )));
            }
        }
        for (i, (name, path)) in paths.iter().enumerate() {
            if let Some((other, _)) = paths[i + 1..].iter().find(|(_, p)| p == path) {
                return Err(Error::config(format!(
                    "{name} and {other} paths are both '{path}'"
                )));
            }
        }

        Ok(())
    }
}

/// Serializes durations the way they are written on the command line.
mod human_duration {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["rclone_exporter"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "0.0.0.0:9116");
        assert_eq!(config.rclone_timeout, Duration::from_secs(120));
        assert_eq!(config.max_concurrent, 10);
        config.validate().unwrap();
    }

    #[test]
    fn flags_are_parsed() {
        let config = parse(&[
            "--web.listen-address",
            "127.0.0.1:9999",
            "--rclone.timeout",
            "90s",
            "--probe.registry",
            "per-probe",
            "--probe.max-concurrent",
            "4",
            "--log.debug",
        ]);

        assert_eq!(config.bind_address(), "127.0.0.1:9999");
        assert_eq!(config.rclone_timeout, Duration::from_secs(90));
        assert_eq!(config.registry_mode, RegistryMode::PerProbe);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.log.level(), tracing::Level::DEBUG);
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        assert!(Config::try_parse_from(["rclone_exporter", "--rclone.timeout", "soon"]).is_err());
    }

    #[test]
    fn most_verbose_level_wins() {
        let log = LogConfig {
            trace: true,
            error: true,
            ..Default::default()
        };
        assert_eq!(log.level(), tracing::Level::TRACE);
        assert_eq!(LogConfig::default().level(), tracing::Level::INFO);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config {
            rclone_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config = Config {
            max_concurrent: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config = Config {
            probe_path: "probe".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config = Config {
            health_path: DEFAULT_METRICS_PATH.to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config = Config {
            listen_address: "localhost".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_serialize_human_readable() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["rclone_timeout"], "2m");
        assert_eq!(json["shutdown_timeout"], "10s");
        assert_eq!(json["registry_mode"], "shared");
    }
}
