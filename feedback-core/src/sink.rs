//! Plugin sink contract
//!
//! A sink is a pluggable output that renders some subset of requests. Per
//! request the Event:
//!
//! 1. asks every registered sink whether it `can_handle` the request
//! 2. lets the filter-sinks hook veto candidates
//! 3. calls `prepare` on the survivors, each with its own [`SinkHandle`]
//! 4. calls `play` on all of them once every one has synchronized
//! 5. always calls `stop`, even if `play` never happened
//!
//! Sinks keep per-request state in the [`Request`] data map under their own
//! name.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SinkResult;
use crate::request::Request;
use crate::signal::{Signal, SignalSender, SinkSignal};

pub trait Sink: Send + Sync {
    /// Unique name; also the key of this sink's request data
    fn name(&self) -> &str;

    /// Called once at daemon startup
    fn initialize(&self) -> SinkResult<()> {
        Ok(())
    }

    /// Called once at daemon shutdown
    fn shutdown(&self) {}

    /// Side-effect free capability probe
    fn can_handle(&self, request: &Request) -> bool;

    /// Stage resources; report readiness with `handle.synchronize()` or
    /// failure with `handle.fail()`
    fn prepare(&self, request: &mut Request, handle: SinkHandle) -> SinkResult<()>;

    fn play(&self, request: &mut Request) -> SinkResult<()>;

    fn pause(&self, _request: &mut Request, _paused: bool) {}

    /// Release everything allocated for `request`; must be idempotent
    fn stop(&self, request: &mut Request);
}

/// Callback handle given to a sink for one prepare round
///
/// Signals carry the generation of the round they belong to; signals from
/// an earlier round (before a resync) are ignored by the Event.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    sender: SignalSender,
    sink: String,
    generation: u64,
}

impl SinkHandle {
    pub fn new(sender: SignalSender, sink: impl Into<String>, generation: u64) -> Self {
        Self {
            sender,
            sink: sink.into(),
            generation,
        }
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The sink is ready to play
    pub fn synchronize(&self) -> bool {
        self.send(SinkSignal::Synchronized)
    }

    /// Ask for every sink of the request to be prepared again
    pub fn resync(&self) -> bool {
        self.send(SinkSignal::Resync)
    }

    pub fn complete(&self) -> bool {
        self.send(SinkSignal::Completed)
    }

    pub fn fail(&self) -> bool {
        self.send(SinkSignal::Failed)
    }

    fn send(&self, signal: SinkSignal) -> bool {
        self.sender.send(Signal::Sink {
            sink: self.sink.clone(),
            generation: self.generation,
            signal,
        })
    }
}

/// The set of registered sinks
#[derive(Default)]
pub struct SinkRegistry {
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink, replacing any sink with the same name
    pub fn register(&self, sink: Arc<dyn Sink>) {
        let mut sinks = self.sinks.write();
        if let Some(existing) = sinks.iter_mut().find(|s| s.name() == sink.name()) {
            tracing::debug!("Replacing sink {}", sink.name());
            *existing = sink;
        } else {
            tracing::debug!("Registered sink {}", sink.name());
            sinks.push(sink);
        }
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Sink>> {
        let mut sinks = self.sinks.write();
        let pos = sinks.iter().position(|s| s.name() == name)?;
        Some(sinks.remove(pos))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Sink>> {
        self.sinks.read().iter().find(|s| s.name() == name).cloned()
    }

    /// Snapshot of the registered sinks, in registration order
    pub fn all(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.sinks.read().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    /// Initialize every sink; sinks that fail are unregistered
    ///
    /// Returns the number of sinks left.
    pub fn initialize_all(&self) -> usize {
        for sink in self.all() {
            if let Err(e) = sink.initialize() {
                tracing::warn!(sink = sink.name(), "{}, disabling sink", e);
                self.unregister(sink.name());
            } else {
                tracing::debug!(sink = sink.name(), "Sink initialized");
            }
        }
        self.len()
    }

    pub fn shutdown_all(&self) {
        for sink in self.all() {
            sink.shutdown();
            tracing::debug!(sink = sink.name(), "Sink shut down");
        }
    }
}

impl fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRegistry")
            .field("sinks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::request::RequestId;
    use crate::signal::signal_channel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedSink {
        name: &'static str,
        fail_init: bool,
        shutdowns: AtomicUsize,
    }

    impl NamedSink {
        fn new(name: &'static str, fail_init: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_init,
                shutdowns: AtomicUsize::new(0),
            })
        }
    }

    impl Sink for NamedSink {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&self) -> SinkResult<()> {
            if self.fail_init {
                return Err(SinkError::Initialize {
                    sink: self.name.to_string(),
                    message: "device missing".to_string(),
                });
            }
            Ok(())
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }

        fn can_handle(&self, _request: &Request) -> bool {
            true
        }

        fn prepare(&self, _request: &mut Request, handle: SinkHandle) -> SinkResult<()> {
            handle.synchronize();
            Ok(())
        }

        fn play(&self, _request: &mut Request) -> SinkResult<()> {
            Ok(())
        }

        fn stop(&self, _request: &mut Request) {}
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = SinkRegistry::new();
        registry.register(NamedSink::new("audio", false));
        registry.register(NamedSink::new("vibra", false));
        registry.register(NamedSink::new("audio", false));

        assert_eq!(registry.names(), vec!["audio", "vibra"]);
        assert!(registry.get("vibra").is_some());
        assert!(registry.unregister("vibra").is_some());
        assert!(registry.get("vibra").is_none());
    }

    #[test]
    fn test_initialize_drops_failing_sinks() {
        let registry = SinkRegistry::new();
        let good = NamedSink::new("led", false);
        registry.register(good.clone());
        registry.register(NamedSink::new("broken", true));

        assert_eq!(registry.initialize_all(), 1);
        assert_eq!(registry.names(), vec!["led"]);

        registry.shutdown_all();
        assert_eq!(good.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_tags_signals() {
        let (tx, mut rx) = signal_channel();
        let handle = SinkHandle::new(SignalSender::new(RequestId::new(5), tx), "canberra", 3);

        handle.synchronize();
        handle.fail();

        let (_, first) = rx.try_recv().unwrap();
        assert_eq!(
            first,
            Signal::Sink {
                sink: "canberra".to_string(),
                generation: 3,
                signal: SinkSignal::Synchronized
            }
        );
        let (_, second) = rx.try_recv().unwrap();
        assert!(matches!(
            second,
            Signal::Sink {
                signal: SinkSignal::Failed,
                ..
            }
        ));
    }
}
