//! Tracing subscriber setup for binaries.
//!
//! Libraries only emit `tracing` events; a binary installs a subscriber once
//! at startup with [`init_logging`] and keeps the returned guard alive until
//! exit so buffered file output is flushed.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default log level when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file name used inside the log directory.
pub const LOG_FILE_NAME: &str = "cachepilot.log";

/// Logging options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `debug`,
    /// `cachepilot=trace`).
    pub level: String,
    /// Also write logs to a daily-rotated file in this directory.
    pub directory: Option<PathBuf>,
    /// Write human-readable output to stderr.
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            stderr: true,
        }
    }
}

impl LoggingConfig {
    /// Log to files under `directory` as well.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the default filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Keeps the non-blocking file writer running.
///
/// Dropping the guard flushes pending log lines.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Returns an error if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, String> {
    let filter = build_filter(&config.level);

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(LocalTime::rfc_3339())
            .with_target(false)
            .boxed()
    });

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let (writer, guard) = file_writer(directory);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("failed to install tracing subscriber: {}", e))?;

    Ok(LoggingGuard { _file: guard })
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

fn file_writer(directory: &Path) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(directory, LOG_FILE_NAME);
    tracing_appender::non_blocking(appender)
}
