//! Exporter metrics endpoint.

use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::metrics;

/// The global registry: lifetime counters, build info and, with a shared
/// registry, the last-known series of every probed remote.
pub async fn exporter_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state.metrics().encode_global().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        ApiError::internal(format!("Failed to encode metrics: {}", e))
    })?;
    Ok(([(CONTENT_TYPE, metrics::CONTENT_TYPE)], body))
}

#[cfg(test)]
mod tests {
    use super::super::create_router;
    use super::super::test_support::{get, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn exposes_counters_and_build_info() {
        let state = state();
        get(create_router(state.clone()), "/probe?remote=a:").await;
        get(create_router(state.clone()), "/probe?remote=").await;

        let (response, body) = get(create_router(state), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body.contains("rclone_exporter_probe_requests_total 2"));
        assert!(body.contains("rclone_exporter_scrape_errors_total 1"));
        assert!(body.contains("rclone_exporter_build_info{"));
        assert!(body.contains("rclone_remote_size_bytes{remote=\"a:\"} 1000"));
    }
}
