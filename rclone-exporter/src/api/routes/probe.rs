//! Probe endpoint.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query, State, rejection::QueryRejection},
    http::{
        HeaderMap,
        header::{CONTENT_TYPE, USER_AGENT},
        request::Parts,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::metrics;
use crate::probe::ProbeError;

/// Query parameters of the probe endpoint.
#[derive(Debug, Deserialize)]
pub struct ProbeParams {
    pub remote: Option<String>,
}

/// Peer address of the connection, when the server recorded one.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

/// Probe one remote and return its metrics.
///
/// A query string that cannot be decoded counts as a missing `remote`.
pub async fn probe(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
    params: Result<Query<ProbeParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let remote = params.ok().and_then(|Query(params)| params.remote);

    match state.orchestrator.run_detached(remote.clone()).await {
        Ok(body) => Ok(([(CONTENT_TYPE, metrics::CONTENT_TYPE)], body)),
        Err(err) => {
            let client = client.map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
            let remote = remote.as_deref().unwrap_or_default();
            let user_agent = headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();

            match &err {
                ProbeError::InvalidInput(_) | ProbeError::Throttled => warn!(
                    client = %client,
                    remote = %remote,
                    user_agent = %user_agent,
                    kind = err.kind(),
                    error = %err,
                    "Probe rejected"
                ),
                _ => error!(
                    client = %client,
                    remote = %remote,
                    user_agent = %user_agent,
                    kind = err.kind(),
                    error = %err,
                    "Probe failed"
                ),
            }

            Err(ApiError::from(err))
        }
    }
}
