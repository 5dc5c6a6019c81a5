//! Error types for the orchestration core

use std::num::ParseIntError;
use thiserror::Error;

/// Errors reported by output backends (audio, tone generator, vibrator, LED, backlight)
///
/// Backend failures during setup are never fatal to an Event; the affected
/// modality is skipped and the error is logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused or failed an operation
    #[error("{backend} backend failed to {operation}: {message}")]
    Operation {
        backend: &'static str,
        operation: &'static str,
        message: String,
    },

    /// A named pattern is not known to the backend
    #[error("Unknown {backend} pattern '{pattern}'")]
    UnknownPattern {
        backend: &'static str,
        pattern: String,
    },

    /// A file the backend was asked to render does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The backend is not available (not configured or shut down)
    #[error("{0} backend is not available")]
    Unavailable(&'static str),
}

/// Errors reported by plugin sinks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Sink failed to initialize at daemon startup
    #[error("Sink '{sink}' failed to initialize: {message}")]
    Initialize { sink: String, message: String },

    /// Sink could not stage resources for a request
    #[error("Sink '{sink}' failed to prepare: {message}")]
    Prepare { sink: String, message: String },

    /// Sink could not start playback
    #[error("Sink '{sink}' failed to play: {message}")]
    Play { sink: String, message: String },
}

/// Errors building a controller template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The pattern contained no steps
    #[error("Controller pattern is empty")]
    EmptyPattern,

    /// A step is not of the form `time=value`
    #[error("Malformed controller step '{0}', expected time=value")]
    MalformedStep(String),

    /// A step field is not an unsigned integer
    #[error("Invalid number in controller step '{step}': {source}")]
    InvalidNumber {
        step: String,
        #[source]
        source: ParseIntError,
    },
}

/// Errors driving an Event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// `start` was called on an Event that already left the Created state
    #[error("Event {0} has already been started")]
    AlreadyStarted(String),
}

/// Any error raised by the orchestration core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Event(#[from] EventError),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result type for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BackendError::Operation {
            backend: "audio",
            operation: "prepare",
            message: "no such device".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "audio backend failed to prepare: no such device"
        );

        let err = ControllerError::MalformedStep("100".to_string());
        assert!(err.to_string().contains("'100'"));
    }

    #[test]
    fn test_core_error_conversion() {
        let err: CoreError = SinkError::Play {
            sink: "canberra".to_string(),
            message: "busy".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Sink(_)));
        assert_eq!(err.to_string(), "Sink 'canberra' failed to play: busy");
    }
}
