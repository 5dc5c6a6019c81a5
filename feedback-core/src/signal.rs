//! Asynchronous signals delivered to Events
//!
//! Backends, timers and sinks never call into an Event directly. They send
//! a `(RequestId, Signal)` message on the daemon's signal channel and the
//! daemon loop hands it to the owning Event, one message at a time.

use std::fmt;

use tokio::sync::mpsc;

use crate::request::RequestId;

/// Sending half of the signal channel
pub type SignalTx = mpsc::UnboundedSender<(RequestId, Signal)>;

/// Receiving half of the signal channel
pub type SignalRx = mpsc::UnboundedReceiver<(RequestId, Signal)>;

/// Create a new signal channel
pub fn signal_channel() -> (SignalTx, SignalRx) {
    mpsc::unbounded_channel()
}

/// Identifier of one audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u32);

impl StreamId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// State reported by the audio backend for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Started,
    Completed,
    Failed,
}

/// Which of an Event's timers fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Forced completion cutoff
    MaxLength,
    /// Periodic vibration completion check
    VibraPoll,
    /// Client stop postponed until the minimum play time has passed
    DeferredStop,
}

/// Callback a sink makes about its own progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSignal {
    /// Sink is prepared and ready to play
    Synchronized,
    /// Sink asks for every sink to be prepared again
    Resync,
    Completed,
    Failed,
}

/// A message addressed to one Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Audio {
        stream: StreamId,
        state: StreamState,
    },
    Timer {
        kind: TimerKind,
        generation: u64,
    },
    Sink {
        sink: String,
        generation: u64,
        signal: SinkSignal,
    },
}

/// Sender bound to one request
#[derive(Debug, Clone)]
pub struct SignalSender {
    request: RequestId,
    tx: SignalTx,
}

impl SignalSender {
    pub fn new(request: RequestId, tx: SignalTx) -> Self {
        Self { request, tx }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Queue a signal; returns `false` if the daemon loop has gone away
    pub fn send(&self, signal: Signal) -> bool {
        if self.tx.send((self.request, signal)).is_err() {
            tracing::debug!(request = %self.request, "Signal receiver dropped");
            return false;
        }
        true
    }
}

/// Handle given to the audio backend to report one stream's state
#[derive(Debug, Clone)]
pub struct StreamNotifier {
    sender: SignalSender,
    stream: StreamId,
}

impl StreamNotifier {
    pub fn new(sender: SignalSender, stream: StreamId) -> Self {
        Self { sender, stream }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn request(&self) -> RequestId {
        self.sender.request()
    }

    pub fn notify(&self, state: StreamState) -> bool {
        self.sender.send(Signal::Audio {
            stream: self.stream,
            state,
        })
    }
}
