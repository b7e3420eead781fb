//! Logging setup.
//!
//! Installs a `tracing` subscriber writing human-readable lines to stderr and,
//! when a directory is configured, to a daily-rotated log file. `RUST_LOG`
//! takes precedence over the configured level.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AgentError, AgentResult};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set (e.g. `info`, `fwagent=debug`).
    pub level: String,
    /// Directory for rotated log files; stderr only when `None`.
    pub directory: Option<PathBuf>,
    /// File name prefix of rotated log files.
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "fwagent.log".to_string(),
        }
    }
}

/// Keeps the background log writer alive; drop it last.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`AgentError::Config`] for an invalid filter directive or when a
/// global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> AgentResult<LoggingGuard> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| AgentError::Config(format!("log level '{}': {}", config.level, e)))?,
    };

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| AgentError::Config(e.to_string()))?;

            Ok(LoggingGuard { _file: Some(guard) })
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .map_err(|e| AgentError::Config(e.to_string()))?;

            Ok(LoggingGuard { _file: None })
        }
    }
}
