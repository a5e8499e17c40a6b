//! API route modules.
//!
//! Endpoint paths come from the configuration; `/` always serves the
//! landing page and anything else is a 404.

pub mod config;
pub mod health;
pub mod landing;
pub mod metrics;
pub mod probe;
pub mod remotes;

use axum::{Router, routing::get};

use crate::api::error::ApiError;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    Router::new()
        .route("/", get(landing::landing_page))
        .route(&config.telemetry_path, get(metrics::exporter_metrics))
        .route(&config.probe_path, get(probe::probe))
        .route(&config.health_path, get(health::health_check))
        .route(&config.remotes_path, get(remotes::list_remotes))
        .route(&config.config_path, get(config::show_config))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use axum::{Router, body::Body, http::Request, response::Response};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::api::server::AppState;
    use crate::config::Config;
    use crate::metrics::{MetricsManager, RegistryMode};
    use crate::probe::{ProbeError, ProbeOrchestrator, SizeProbe};
    use crate::rclone::{ProbeResult, RcloneClient, RemoteIdentifier, parse_size_output};

    /// Answers every probe with the same canned `rclone size` output.
    pub struct CannedProbe(pub &'static [u8]);

    #[async_trait]
    impl SizeProbe for CannedProbe {
        async fn probe(&self, _remote: &RemoteIdentifier) -> Result<ProbeResult, ProbeError> {
            Ok(parse_size_output(self.0)?)
        }
    }

    pub fn state_with(probe: Arc<dyn SizeProbe>, config: Config) -> AppState {
        let config = Arc::new(config);
        let metrics = Arc::new(MetricsManager::new(config.registry_mode).unwrap());
        let orchestrator = Arc::new(ProbeOrchestrator::new(probe, metrics, config.max_concurrent));
        let rclone = Arc::new(RcloneClient::new(
            "/nonexistent/rclone",
            config.rclone_timeout,
        ));
        AppState::new(config, rclone, orchestrator)
    }

    pub fn state() -> AppState {
        state_with(
            Arc::new(CannedProbe(br#"{"count": 42, "bytes": 1000}"#)),
            Config {
                registry_mode: RegistryMode::Shared,
                ..Config::default()
            },
        )
    }

    pub async fn get(app: Router, uri: &str) -> (Response, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        (
            Response::from_parts(parts, Body::empty()),
            String::from_utf8(bytes.to_vec()).unwrap(),
        )
    }
}
