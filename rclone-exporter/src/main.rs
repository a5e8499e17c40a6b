use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use rclone_exporter::api::{ApiServer, AppState};
use rclone_exporter::config::Config;
use rclone_exporter::logging;
use rclone_exporter::metrics::{BuildInfo, MetricsManager};
use rclone_exporter::probe::ProbeOrchestrator;
use rclone_exporter::rclone::RcloneClient;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let _log_guard = logging::init_logging(&config.log).context("failed to set up logging")?;
    config.validate().context("invalid configuration")?;

    let build = BuildInfo::current();
    info!(
        version = build.version,
        commit = build.commit,
        build_date = build.build_date,
        "Starting rclone_exporter"
    );

    let mut rclone = RcloneClient::new(&config.rclone_path, config.rclone_timeout);
    rclone
        .check_binary_available()
        .await
        .context("rclone binary is not accessible or not functioning")?;
    let rclone = Arc::new(rclone);

    let metrics = Arc::new(
        MetricsManager::new(config.registry_mode).context("failed to register metrics")?,
    );
    let orchestrator = Arc::new(ProbeOrchestrator::new(
        rclone.clone(),
        metrics.clone(),
        config.max_concurrent,
    ));

    let config = Arc::new(config);
    info!(
        listen = %config.bind_address(),
        metrics_path = %config.telemetry_path,
        probe_path = %config.probe_path,
        health_path = %config.health_path,
        remotes_path = %config.remotes_path,
        config_path = %config.config_path,
        rclone_bin = %rclone.binary_path(),
        timeout = ?config.rclone_timeout,
        max_concurrent = config.max_concurrent,
        registry = %config.registry_mode,
        "rclone_exporter is up"
    );

    let server = ApiServer::new(AppState::new(config, rclone, orchestrator));
    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received");
        cancel_token.cancel();
    });

    server.run().await.context("HTTP server failed")?;

    metrics.close();
    info!("Exporter shutdown completed");
    Ok(())
}
