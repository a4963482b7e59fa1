//! Session logging
//!
//! Warnings and errors go to stderr. When enabled, everything accepted by the
//! configured filter also goes to `<log_dir>/<YYYY-Mon-DD_HH-MM-SS>/session.log`
//! through a non-blocking writer. Notable targets:
//!
//! - `telemetry::rx` - every decoded sample
//! - `telemetry::tx` - every published value
//! - `topics` - topic creation, transfers, dropped forwards

use crate::config::LoggingConfig;
use crate::error::{Result, TelemetryError};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Name of the log file inside a session directory
pub const SESSION_LOG_FILE: &str = "session.log";

/// Keeps the file writer alive; dropping it flushes the log
#[derive(Debug)]
pub struct LogSession {
    /// Directory of this session's log, if file logging is on
    pub directory: Option<PathBuf>,
    _guard: Option<WorkerGuard>,
}

/// Directory name of a session started at `now`
pub fn session_dir_name(now: DateTime<Local>) -> String {
    now.format("%Y-%b-%d_%H-%M-%S").to_string()
}

fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn create_session_dir(root: &Path) -> Result<PathBuf> {
    let dir = root.join(session_dir_name(Local::now()));
    std::fs::create_dir_all(&dir).map_err(|e| {
        TelemetryError::Config(format!("Failed to create log directory {:?}: {}", dir, e))
    })?;
    Ok(dir)
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed or the log directory cannot
/// be created.
pub fn init(config: &LoggingConfig) -> Result<LogSession> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN);

    let (file_layer, directory, guard) = match config
        .enabled
        .then(|| config.resolved_directory())
        .flatten()
    {
        Some(root) => {
            let dir = create_session_dir(&root)?;
            let appender = tracing_appender::rolling::never(&dir, SESSION_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter(&config.filter));
            (Some(layer), Some(dir), Some(guard))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TelemetryError::Config(format!("Failed to install logger: {}", e)))?;

    if let Some(dir) = &directory {
        tracing::info!("Session log in {:?}", dir);
    }

    Ok(LogSession {
        directory,
        _guard: guard,
    })
}
