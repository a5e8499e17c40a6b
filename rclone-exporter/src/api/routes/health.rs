//! Health check route.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::server::AppState;
use crate::metrics::BuildInfo;

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub build_date: &'static str,
    pub uptime: String,
}

/// Liveness: answers as long as the server is responsive.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let build = BuildInfo::current();
    Json(HealthResponse {
        status: "OK",
        version: build.version,
        commit: build.commit,
        build_date: build.build_date,
        uptime: state.uptime(),
    })
}
