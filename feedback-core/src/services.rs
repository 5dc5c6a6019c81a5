//! Process-wide services shared by every Event

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedback_store::Context;

use crate::backend::Backends;
use crate::hook::CoreHooks;
use crate::manager::EventManager;
use crate::signal::StreamId;
use crate::sink::SinkRegistry;

/// Tunables of the orchestration core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Period of the vibration completion poll in silent mode
    /// Default: 500 milliseconds
    pub vibra_poll_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            vibra_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Injected services: context, hooks, backends, sinks and the registry
///
/// Built once at startup and shared as `Arc<Services>`.
pub struct Services {
    pub context: Arc<Context>,
    pub hooks: CoreHooks,
    pub backends: Backends,
    pub sinks: SinkRegistry,
    pub manager: EventManager,
    pub config: CoreConfig,
    next_stream: AtomicU32,
}

impl Services {
    pub fn new(context: Arc<Context>, manager: EventManager) -> Self {
        Self {
            context,
            hooks: CoreHooks::new(),
            backends: Backends::new(),
            sinks: SinkRegistry::new(),
            manager,
            config: CoreConfig::default(),
            next_stream: AtomicU32::new(1),
        }
    }

    pub fn with_backends(mut self, backends: Backends) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sinks(mut self, sinks: SinkRegistry) -> Self {
        self.sinks = sinks;
        self
    }

    /// Allocate a process-unique audio stream id
    pub fn next_stream_id(&self) -> StreamId {
        StreamId::new(self.next_stream.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("context", &self.context)
            .field("backends", &self.backends)
            .field("sinks", &self.sinks)
            .field("config", &self.config)
            .finish()
    }
}
