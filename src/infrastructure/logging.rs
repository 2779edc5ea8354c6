//! Centralized file-based logging system
//!
//! Writes logs to files under the configured directory, separated by log type:
//! - main/ - General application logs (JSON)
//! - error/ - Error and warning logs only
//! - transport/ - Stream, polling, mapping and engine logs
//! - alerts/ - Rule evaluation and delivery logs
//! - api/ - API server logs

use crate::infrastructure::config::LoggingConfig;
use crate::{Result, SyncError};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing::Subscriber;
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter},
    fmt::{
        self,
        format::{DefaultFields, Format},
    },
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_TYPES: [&str; 5] = ["main", "error", "transport", "alerts", "api"];

/// Targets routed to the transport log
fn is_transport_target(target: &str) -> bool {
    target.starts_with("transport")
        || target.starts_with("ws")
        || target.starts_with("mapper")
        || target.starts_with("store")
        || target.starts_with("engine")
}

/// Initialize centralized file logging
///
/// Creates the log directory tree and sets up one rolling appender per log
/// type. `RUST_LOG` overrides the configured level.
/// Returns WorkerGuards which must be kept alive for the duration of the program.
pub fn init_logging(config: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    let logs_dir = Path::new(&config.dir);
    create_log_dirs(logs_dir)?;

    let mut guards = Vec::new();
    let mut appender = |name: &str| {
        let (writer, guard) = create_appender(&logs_dir.join(name), name);
        guards.push(guard);
        writer
    };

    let main_appender = appender("main");
    let error_appender = appender("error");
    let transport_appender = appender("transport");
    let alerts_appender = appender("alerts");
    let api_appender = appender("api");

    // Main log - everything, as JSON
    let main_layer = file_layer(main_appender).with_thread_names(true).json();

    // Error log - ERROR and WARN only
    let error_layer = file_layer(error_appender).with_filter(LevelFilter::WARN);

    let transport_layer = file_layer(transport_appender)
        .with_filter(filter_fn(|metadata| is_transport_target(metadata.target())));

    let alerts_layer = file_layer(alerts_appender)
        .with_filter(filter_fn(|metadata| metadata.target().starts_with("alerts")));

    let api_layer = file_layer(api_appender).with_filter(filter_fn(|metadata| {
        metadata.target().starts_with("api") || metadata.target().starts_with("tower_http")
    }));

    // Console layer for development
    let console_layer = config
        .console
        .then(|| fmt::layer().with_target(true).with_level(true));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(main_layer)
        .with(error_layer)
        .with(transport_layer)
        .with(alerts_layer)
        .with(api_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| SyncError::Config(format!("logging already initialized: {e}")))?;

    tracing::info!("Logging system initialized. Log files in {}", logs_dir.display());

    Ok(guards)
}

fn create_log_dirs(logs_dir: &Path) -> std::io::Result<()> {
    for log_type in &LOG_TYPES {
        fs::create_dir_all(logs_dir.join(log_type))?;
    }
    Ok(())
}

/// Plain-text layer over one log file
fn file_layer<S>(writer: NonBlocking) -> fmt::Layer<S, DefaultFields, Format, NonBlocking>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
}

/// Create a daily rolling file appender
fn create_appender(dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, format!("{name}.log"));
    tracing_appender::non_blocking(appender)
}

/// Log macro helpers for specific log types
#[macro_export]
macro_rules! log_ws {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "ws", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_transport {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "transport", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_alerts {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "alerts", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_api {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "api", $level, $($arg)+)
    };
}
