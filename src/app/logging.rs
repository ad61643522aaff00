//! Usage: Process-wide tracing setup (stderr + daily rolling file) and panic hook.

use crate::infra::app_paths::ensure_dir;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

pub(crate) const LOG_FILE_PREFIX: &str = "spotify-profile.log";

/// Keeps the non-blocking file writer alive; drop it last so buffered lines are flushed.
#[must_use]
pub(crate) struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub(crate) fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

pub(crate) fn init(level: &str, log_dir: Option<&Path>) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(level)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    let mut file_error: Option<String> = None;
    let (file_layer, file_guard) = match log_dir {
        Some(dir) => match ensure_dir(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                (Some(layer), Some(guard))
            }
            Err(err) => {
                file_error = Some(err.to_string());
                (None, None)
            }
        },
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already initialized (tests, or a second call); keep the existing subscriber.
        return LoggingGuard { _file: file_guard };
    }
    if let Err(err) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge not installed: {}", err);
    }

    if let Some(err) = file_error {
        tracing::warn!("file logging disabled: {}", err);
    }
    install_panic_hook();

    LoggingGuard { _file: file_guard }
}

fn install_panic_hook() {
    // Payload is not logged: it may carry token material.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        tracing::error!(
            location = %location,
            "PANIC: application panicked at {location}. Check the log file for context leading up to this panic."
        );
    }));
}
