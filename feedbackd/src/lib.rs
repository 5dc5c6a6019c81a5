//! # feedbackd
//!
//! The feedback event daemon: accepts play requests for named feedback
//! events, resolves them through the configured event table and drives the
//! resulting Events on top of [`feedback_core`].
//!
//! ## Modules
//!
//! - [`config`]: JSON configuration with the event table and tunables
//! - [`daemon`]: request validation, Event ownership and status reports
//! - [`service`]: the single-task run loop over the line protocol
//! - [`transport`]: JSON-lines command and response types
//! - [`backends`]: simulated output backends
//! - [`logging`]: `tracing-subscriber` setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use feedbackd::{config::DaemonConfig, service};
//! use tokio::io::BufReader;
//!
//! let config = DaemonConfig::builtin();
//! let services = Arc::new(service::build_services(&config)?);
//!
//! service::run(
//!     services,
//!     BufReader::new(tokio::io::stdin()),
//!     tokio::io::stdout(),
//!     async { let _ = tokio::signal::ctrl_c().await; },
//! )
//! .await?;
//! ```

pub mod backends;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod service;
pub mod transport;

// Re-export main types for convenience
pub use config::DaemonConfig;
pub use daemon::{Daemon, StatusCode, StatusReport};
pub use error::{ConfigError, DaemonError, Rejection, Result};
pub use logging::{init_logging, init_logging_from_env, LoggingMode};
pub use transport::{Command, Response};
