//! Logging setup for the daemon
//!
//! Logs always go to stderr: stdout carries the line protocol and must stay
//! clean.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output
    #[default]
    Development,
    /// Verbose diagnostics with source locations
    Debug,
}

impl LoggingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggingMode::Silent => "silent",
            LoggingMode::Development => "development",
            LoggingMode::Debug => "debug",
        }
    }
}

impl fmt::Display for LoggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggingMode {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" => Ok(LoggingMode::Silent),
            "development" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            other => Err(LoggingError::InvalidMode(other.to_string())),
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Unknown log mode '{0}', expected silent, development or debug")]
    InvalidMode(String),
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `FEEDBACKD_LOG_LEVEL`: filter directives, e.g. `debug` or
///   `feedback_core=trace,info`
/// - `RUST_LOG`: used when `FEEDBACKD_LOG_LEVEL` is not set
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info");

            Registry::default()
                .with(
                    tracing_fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug");

            Registry::default()
                .with(
                    tracing_fmt::layer()
                        .with_writer(std::io::stderr)
                        .pretty()
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `FEEDBACKD_LOG_MODE`
///
/// Unset means [`LoggingMode::Development`]; an unknown value is an error.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("FEEDBACKD_LOG_MODE") {
        Ok(value) => value.parse()?,
        Err(_) => LoggingMode::default(),
    };
    init_logging(mode)
}

/// `FEEDBACKD_LOG_LEVEL`, then `RUST_LOG`, then `default_level`
fn create_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("FEEDBACKD_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Check if a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
