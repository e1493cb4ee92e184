//! Logging setup.
//!
//! Console output goes through a caller-supplied writer so the CLI can keep
//! progress bars intact. An optional daily rotated file receives the same
//! events without colours.

use std::path::{Path, PathBuf};

use thiserror::Error;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Timestamp layout of every log line.
const TIME_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

/// Prefix of the rotated log files.
const LOG_FILE_PREFIX: &str = "buccotiles";

/// Errors setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("invalid time format: {0}")]
    TimeFormat(String),

    #[error("failed to open log directory {}: {reason}", path.display())]
    LogFile { path: PathBuf, reason: String },

    #[error("a global logger is already installed: {0}")]
    Init(String),
}

/// Filter from `RUST_LOG`, else from `default_directive`.
pub fn build_filter(default_directive: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directive).map_err(|e| LoggingError::Filter {
        directive: default_directive.to_string(),
        reason: e.to_string(),
    })
}

/// Local-time timestamps.
pub fn timer() -> Result<LocalTime<Vec<time::format_description::BorrowedFormatItem<'static>>>, LoggingError> {
    let format = time::format_description::parse_borrowed::<2>(TIME_FORMAT)
        .map_err(|e| LoggingError::TimeFormat(e.to_string()))?;
    Ok(LocalTime::new(format))
}

/// Daily rotated file appender in `dir`.
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender, LoggingError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| LoggingError::LogFile {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Install the global subscriber.
///
/// `level` overrides the configured level (for `-v`/`-q`); `RUST_LOG` wins
/// over both. The returned guard flushes the log file when dropped and must
/// be held until exit.
pub fn init<W>(config: &LoggingConfig, level: Option<&str>, console: W) -> Result<Option<WorkerGuard>, LoggingError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = build_filter(level.unwrap_or(&config.level))?;

    let console_layer = fmt::layer()
        .with_timer(timer()?)
        .with_target(false)
        .with_writer(console);

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(dir)?);
            let layer = fmt::layer()
                .with_timer(timer()?)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}
