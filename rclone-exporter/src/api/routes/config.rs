//! Configuration route.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::server::AppState;
use crate::metrics::{BuildInfo, RegistryMode};

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub build_info: BuildInfo,
    pub server_config: ServerConfig,
    pub rclone_config: RcloneConfig,
    pub probe_config: ProbeConfig,
    pub runtime_info: RuntimeInfo,
    pub endpoints: EndpointsConfig,
}

#[derive(Debug, Serialize)]
pub struct ServerConfig {
    pub listen_address: String,
    pub shutdown_timeout: String,
}

#[derive(Debug, Serialize)]
pub struct RcloneConfig {
    pub binary_path: String,
    pub timeout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProbeConfig {
    pub max_concurrent: usize,
    pub available_permits: usize,
    pub registry_mode: RegistryMode,
}

#[derive(Debug, Serialize)]
pub struct RuntimeInfo {
    pub uptime: String,
    pub num_cpu: usize,
}

#[derive(Debug, Serialize)]
pub struct EndpointsConfig {
    pub metrics_path: String,
    pub probe_path: String,
    pub health_path: String,
    pub remotes_path: String,
    pub config_path: String,
}

/// Effective configuration plus a little runtime state.
pub async fn show_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    let version = match state.rclone.version().await {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read rclone version");
            None
        }
    };

    Json(ConfigResponse {
        build_info: BuildInfo::current(),
        server_config: ServerConfig {
            listen_address: config.listen_address.clone(),
            shutdown_timeout: humantime::format_duration(config.shutdown_timeout).to_string(),
        },
        rclone_config: RcloneConfig {
            binary_path: state.rclone.binary_path().to_string(),
            timeout: humantime::format_duration(state.rclone.timeout()).to_string(),
            version,
        },
        probe_config: ProbeConfig {
            max_concurrent: state.orchestrator.max_concurrent(),
            available_permits: state.orchestrator.available_permits(),
            registry_mode: state.metrics().mode(),
        },
        runtime_info: RuntimeInfo {
            uptime: state.uptime(),
            num_cpu: std::thread::available_parallelism().map_or(1, |n| n.get()),
        },
        endpoints: EndpointsConfig {
            metrics_path: config.telemetry_path.clone(),
            probe_path: config.probe_path.clone(),
            health_path: config.health_path.clone(),
            remotes_path: config.remotes_path.clone(),
            config_path: config.config_path.clone(),
        },
    })
}
