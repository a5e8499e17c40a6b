//! Logging setup.
//!
//! Console output goes to stderr, either as JSON lines (default) or as
//! human-readable text with ANSI colors. An optional log file receives the
//! same events through a non-blocking writer. Timestamps use the local
//! timezone.

use chrono::Local;
use std::path::Path;
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogConfig;

/// Crates whose events follow the configured level. Everything else logs
/// warnings only unless `RUST_LOG` says otherwise.
const LOGGED_CRATES: &[&str] = &["rclone_exporter", "process_utils", "tower_http"];

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Filter directive for `level`, used when `RUST_LOG` is not set.
pub fn default_filter(level: tracing::Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directive = String::from("warn");
    for name in LOGGED_CRATES {
        directive.push_str(&format!(",{name}={level}"));
    }
    directive
}

/// Open `path` for appending, creating parent directories as needed.
fn open_log_file(path: &Path) -> crate::Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| crate::Error::config(format!("log file '{}' has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(|e| crate::Error::Other(format!("Failed to open log file: {}", e)))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when a log file is configured; keep it
/// alive for the lifetime of the process so buffered lines are flushed.
pub fn init_logging(config: &LogConfig) -> crate::Result<Option<WorkerGuard>> {
    let level = config.level();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let (file, file_error) = match config.file.as_deref().map(open_log_file) {
        Some(Ok((writer, guard))) => (Some((writer, guard)), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let (file_writer, guard) = match file {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let pretty = config.pretty.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_timer(LocalTimer)
    });
    let json = (!config.pretty).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimer)
    });
    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_timer(LocalTimer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    info!(
        level = %level,
        pretty = config.pretty,
        file = ?config.file,
        "Logging initialized"
    );
    if let (Some(path), Some(e)) = (&config.file, file_error) {
        warn!(file = %path.display(), error = %e, "Logging to stderr only");
    }

    Ok(guard)
}
