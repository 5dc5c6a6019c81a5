use std::path::PathBuf;

use feedback_core::{ControllerError, PlayMode};
use thiserror::Error;

use crate::logging::LoggingError;

/// Why a play request was refused before any Event existed
///
/// Rejected requests allocate nothing and are answered with id `0`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Unknown event {0}")]
    UnknownEvent(String),

    #[error("Missing play mode")]
    MissingPlayMode,

    #[error("Unknown play mode {0}")]
    UnknownPlayMode(String),

    #[error("Missing or zero policy id")]
    MissingPolicyId,

    #[error("No resources requested")]
    NoResources,

    #[error("Event {event} has no {mode} prototype")]
    UnresolvedPrototype { event: String, mode: PlayMode },

    #[error("Prototype {0} is not registered")]
    PrototypeNotFound(String),
}

/// Errors loading or validating the daemon configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid pattern for controller {name}: {source}")]
    Controller {
        name: String,
        #[source]
        source: ControllerError,
    },
}

/// Errors that stop the daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            Rejection::UnresolvedPrototype {
                event: "sms".to_string(),
                mode: PlayMode::Short
            }
            .to_string(),
            "Event sms has no short prototype"
        );
        assert_eq!(Rejection::NoResources.to_string(), "No resources requested");
    }

    #[test]
    fn test_config_error_keeps_source() {
        let source = "x".parse::<u32>().unwrap_err();
        let error = ConfigError::Controller {
            name: "ramp".to_string(),
            source: ControllerError::InvalidNumber {
                step: "0=x".to_string(),
                source,
            },
        };
        assert!(error.to_string().starts_with("Invalid pattern for controller ramp"));
        assert!(std::error::Error::source(&error).is_some());
    }
}
