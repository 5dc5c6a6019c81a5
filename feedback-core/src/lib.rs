//! # Feedback Core
//!
//! The orchestration engine of the feedback daemon: it turns a named play
//! request into coordinated audio, vibration, LED and backlight output and
//! reports how that output ends.
//!
//! ## Key Features
//!
//! - **Event State Machine**: one [`Event`] per request, driven by
//!   asynchronous signals and ended by the first terminal one
//! - **Owned Timers and Controllers**: dropping a handle cancels the work,
//!   so nothing fires into an Event that is gone
//! - **Priority Hooks**: extension points run in descending priority with
//!   stable ordering for ties
//! - **Plugin Sinks**: pluggable outputs that prepare, synchronize and play
//!   together
//! - **Injected Backends**: audio, tone generator, vibrator, LEDs and
//!   backlight are traits supplied by the embedding daemon
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use feedback_core::prelude::*;
//! use feedback_store::{Context, Proplist};
//!
//! let mut manager = EventManager::new();
//! manager.register_prototype("ringtone_long", EventPrototype::new("ringtone_long"));
//!
//! let services = Arc::new(
//!     Services::new(Arc::new(Context::new()), manager).with_backends(backends),
//! );
//! let (tx, mut rx) = signal_channel();
//!
//! let prototype = services.manager.prototype("ringtone_long").unwrap();
//! let request = Request::new(RequestId::new(1), "ringtone", Proplist::new());
//! let mut event = Event::new(request, prototype, options, services, tx);
//! event.set_callback(|id, status| println!("{id}: {status}"));
//! event.start(&Proplist::new())?;
//!
//! while let Some((id, signal)) = rx.recv().await {
//!     event.handle_signal(signal);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Services (Arc)
//!     ├── Context          shared blackboard
//!     ├── CoreHooks        init_done, new_request, transform_properties, filter_sinks
//!     ├── Backends         injected hardware traits
//!     ├── SinkRegistry     plugin sinks
//!     └── EventManager     definitions, prototypes, controllers
//!
//! Event ──start──▶ backends / sinks / timers
//!   ▲                        │
//!   └──── (RequestId, Signal) channel ◀──┘
//! ```

pub mod backend;
pub mod controller;
pub mod definition;
pub mod error;
pub mod event;
pub mod hook;
pub mod keys;
pub mod manager;
pub mod request;
pub mod services;
pub mod signal;
pub mod sink;
pub mod timer;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export main types for convenience
pub use backend::{
    AudioBackend, AudioStream, BacklightBackend, Backends, LedBackend, LedId, ToneGenerator,
    ToneId, VibraId, VibraSource, VibraStarted, Vibrator,
};
pub use controller::{Controller, ControllerId, RunningController, Step};
pub use definition::{EventDefinition, EventPrototype, PlayMode};
pub use error::{
    BackendError, BackendResult, ControllerError, CoreError, EventError, Result, SinkError,
    SinkResult,
};
pub use event::{Event, EventOptions, EventState, EventStatus};
pub use hook::{CoreHook, CoreHooks, FilterSinks, Hook, SlotId};
pub use manager::EventManager;
pub use request::{Request, RequestId, Resources};
pub use services::{CoreConfig, Services};
pub use signal::{
    signal_channel, Signal, SignalRx, SignalSender, SignalTx, SinkSignal, StreamId,
    StreamNotifier, StreamState, TimerKind,
};
pub use sink::{Sink, SinkHandle, SinkRegistry};
pub use timer::Timer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::Backends;
    pub use crate::definition::{EventDefinition, EventPrototype, PlayMode};
    pub use crate::event::{Event, EventOptions, EventState, EventStatus};
    pub use crate::manager::EventManager;
    pub use crate::request::{Request, RequestId, Resources};
    pub use crate::services::Services;
    pub use crate::signal::{signal_channel, Signal};
    pub use crate::sink::{Sink, SinkHandle};
}
