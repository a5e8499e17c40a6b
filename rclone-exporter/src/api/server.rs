//! API server setup and configuration.

use axum::Router;
use axum::extract::Request;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::MetricsManager;
use crate::probe::ProbeOrchestrator;
use crate::rclone::RcloneClient;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Parsed command-line configuration
    pub config: Arc<Config>,
    /// Client for the housekeeping commands (version, listremotes)
    pub rclone: Arc<RcloneClient>,
    /// Runs probes and owns the metrics
    pub orchestrator: Arc<ProbeOrchestrator>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        rclone: Arc<RcloneClient>,
        orchestrator: Arc<ProbeOrchestrator>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            config,
            rclone,
            orchestrator,
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsManager> {
        self.orchestrator.metrics()
    }

    /// Uptime rounded to whole seconds, e.g. `1h 2m 3s`.
    pub fn uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        humantime::format_duration(Duration::from_secs(secs)).to_string()
    }
}

/// API server.
pub struct ApiServer {
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let router = routes::create_router(self.state.clone());

        let health_path = self.state.config.health_path.clone();
        let skip_health = move |req: &Request| req.uri().path() == health_path;
        let skip_on_request = skip_health.clone();

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(move |req: &Request| {
                    if skip_health(req) {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_request(move |req: &Request, span: &Span| {
                    if span.is_disabled() || skip_on_request(req) {
                        return;
                    }
                    let mut on_request =
                        tower_http::trace::DefaultOnRequest::new().level(tracing::Level::DEBUG);
                    use tower_http::trace::OnRequest;
                    on_request.on_request(req, span);
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                )
                .on_failure(
                    |class: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let mut on_failure =
                            tower_http::trace::DefaultOnFailure::new().level(tracing::Level::ERROR);
                        use tower_http::trace::OnFailure;
                        on_failure.on_failure(class, latency, span);
                    },
                ),
        )
    }

    /// Bind the configured address and serve until shut down.
    pub async fn run(&self) -> Result<()> {
        let address = self.state.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| Error::ApiError(format!("Failed to bind {}: {}", address, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// After cancellation, in-flight requests get the configured shutdown
    /// timeout to finish; connections still open after that are dropped.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        let router = self.build_router();
        let shutdown_timeout = self.state.config.shutdown_timeout;

        tracing::info!("API server listening on http://{}", local_addr);

        let cancel_token = self.cancel_token.clone();
        let server = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            tracing::info!("API server shutting down...");
        })
        .into_future();

        let deadline = {
            let cancel_token = self.cancel_token.clone();
            async move {
                cancel_token.cancelled().await;
                tokio::time::sleep(shutdown_timeout).await;
            }
        };

        tokio::select! {
            result = server => {
                result.map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;
            }
            _ = deadline => {
                tracing::warn!(
                    timeout = ?shutdown_timeout,
                    "Graceful shutdown timed out, dropping open connections"
                );
            }
        }

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RegistryMode;
    use crate::probe::{ProbeError, SizeProbe};
    use crate::rclone::{ProbeResult, RemoteIdentifier};
    use async_trait::async_trait;

    struct NoProbe;

    #[async_trait]
    impl SizeProbe for NoProbe {
        async fn probe(&self, _remote: &RemoteIdentifier) -> std::result::Result<ProbeResult, ProbeError> {
            Err(ProbeError::Internal("not wired".to_string()))
        }
    }

    fn state(config: Config) -> AppState {
        let config = Arc::new(config);
        let metrics = Arc::new(MetricsManager::new(RegistryMode::Shared).unwrap());
        let orchestrator = Arc::new(ProbeOrchestrator::new(
            Arc::new(NoProbe),
            metrics,
            config.max_concurrent,
        ));
        let rclone = Arc::new(RcloneClient::new(&config.rclone_path, config.rclone_timeout));
        AppState::new(config, rclone, orchestrator)
    }

    #[test]
    fn test_app_state_creation() {
        let state = state(Config::default());
        assert!(state.start_time.elapsed().as_secs() < 1);
        assert_eq!(state.uptime(), "0s");
    }

    #[test]
    fn test_server_creation() {
        let server = ApiServer::new(state(Config::default()));

        let token = server.cancel_token();
        assert!(!token.is_cancelled());
        server.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(ApiServer::new(state(Config::default())));

        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };
        server.shutdown();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = ApiServer::new(state(Config {
            listen_address: taken.local_addr().unwrap().to_string(),
            ..Config::default()
        }));
        assert!(matches!(server.run().await, Err(Error::ApiError(_))));
    }
}
