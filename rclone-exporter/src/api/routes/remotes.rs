//! Remote listing route.

use axum::{Json, extract::State};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::rclone::RemoteInfo;

#[derive(Debug, Serialize)]
pub struct RemotesResponse {
    pub remotes: Vec<RemoteInfo>,
    pub remote_count: usize,
    pub timestamp: String,
}

/// Remotes configured in rclone, with their backend types.
pub async fn list_remotes(State(state): State<AppState>) -> ApiResult<Json<RemotesResponse>> {
    let remotes = state.rclone.list_remotes().await?;
    Ok(Json(RemotesResponse {
        remote_count: remotes.len(),
        remotes,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}
