//! Recording test doubles
//!
//! [`MockBackend`] implements every backend contract and records each call;
//! [`MockSink`] does the same for the sink contract. Both let a test drive
//! the asynchronous side by hand: stream states are pushed through the
//! notifier the Event handed over, and sinks keep their [`SinkHandle`]s.
//!
//! Available in unit tests and, for other crates, behind the
//! `test-support` feature.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use feedback_store::{Context, Proplist};
use parking_lot::Mutex;

use crate::backend::{
    AudioBackend, AudioStream, BacklightBackend, Backends, LedBackend, LedId, ToneGenerator,
    ToneId, VibraId, VibraSource, VibraStarted, Vibrator,
};
use crate::error::{BackendError, BackendResult, SinkError, SinkResult};
use crate::event::Event;
use crate::manager::EventManager;
use crate::request::{Request, RequestId};
use crate::services::Services;
use crate::signal::{SignalRx, StreamId, StreamNotifier, StreamState};
use crate::sink::{Sink, SinkHandle};

/// A call made on [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Prepare {
        stream: StreamId,
        source: String,
        volume: Option<i32>,
    },
    Play(StreamId),
    Pause(StreamId, bool),
    StopStream(StreamId),
    SetVolume(StreamId, i32),
    ToneStart { pattern: i32, volume: i32 },
    ToneStop(ToneId),
    VibraStart(String),
    VibraStop(VibraId),
    LedActivate(String),
    LedDeactivate(LedId),
    DisplayOn { unlock: bool },
    SetDisplay(bool),
    BacklightRelease,
}

/// Records every backend call and lets tests script failures
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    notifiers: Mutex<HashMap<StreamId, StreamNotifier>>,
    failing_sources: Mutex<HashSet<String>>,
    vibra_files: Mutex<HashSet<PathBuf>>,
    vibra_repeating: AtomicBool,
    vibra_completed: AtomicBool,
    tonegen_failing: AtomicBool,
    next_id: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A [`Backends`] set with every slot backed by this mock
    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends::new()
            .with_audio(self.clone())
            .with_tonegen(self.clone())
            .with_vibrator(self.clone())
            .with_led(self.clone())
            .with_backlight(self.clone())
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count<F: Fn(&BackendCall) -> bool>(&self, predicate: F) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Sources of every prepared stream, in order
    pub fn prepared_sources(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Prepare { source, .. } => Some(source.clone()),
                _ => None,
            })
            .collect()
    }

    /// The most recently prepared stream
    pub fn last_stream(&self) -> Option<StreamId> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            BackendCall::Prepare { stream, .. } => Some(*stream),
            _ => None,
        })
    }

    /// Report a stream state through the notifier given to `prepare`
    pub fn notify(&self, stream: StreamId, state: StreamState) -> bool {
        let notifier = self.notifiers.lock().get(&stream).cloned();
        notifier.is_some_and(|n| n.notify(state))
    }

    /// Make `prepare` fail for `source`
    pub fn fail_prepare_for(&self, source: impl Into<String>) {
        self.failing_sources.lock().insert(source.into());
    }

    /// Make a custom vibration file "exist"
    pub fn add_vibra_file(&self, path: impl Into<PathBuf>) {
        self.vibra_files.lock().insert(path.into());
    }

    pub fn set_vibra_repeating(&self, repeating: bool) {
        self.vibra_repeating.store(repeating, Ordering::SeqCst);
    }

    pub fn set_vibra_completed(&self, completed: bool) {
        self.vibra_completed.store(completed, Ordering::SeqCst);
    }

    pub fn set_tonegen_failing(&self, failing: bool) {
        self.tonegen_failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl AudioBackend for MockBackend {
    fn prepare(&self, stream: &AudioStream, notifier: StreamNotifier) -> BackendResult<()> {
        self.record(BackendCall::Prepare {
            stream: stream.id,
            source: stream.source.clone(),
            volume: stream.volume,
        });
        if self.failing_sources.lock().contains(&stream.source) {
            return Err(BackendError::Operation {
                backend: "audio",
                operation: "prepare",
                message: format!("cannot open {}", stream.source),
            });
        }
        self.notifiers.lock().insert(stream.id, notifier);
        Ok(())
    }

    fn play(&self, stream: StreamId) -> BackendResult<()> {
        self.record(BackendCall::Play(stream));
        Ok(())
    }

    fn pause(&self, stream: StreamId, paused: bool) -> BackendResult<()> {
        self.record(BackendCall::Pause(stream, paused));
        Ok(())
    }

    fn stop(&self, stream: StreamId) {
        self.record(BackendCall::StopStream(stream));
    }

    fn set_volume(&self, stream: StreamId, volume: i32) {
        self.record(BackendCall::SetVolume(stream, volume));
    }
}

impl ToneGenerator for MockBackend {
    fn start(&self, pattern: i32, volume: i32) -> BackendResult<ToneId> {
        if self.tonegen_failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("tonegen"));
        }
        self.record(BackendCall::ToneStart { pattern, volume });
        Ok(ToneId::new(self.next_id()))
    }

    fn stop(&self, tone: ToneId) {
        self.record(BackendCall::ToneStop(tone));
    }
}

impl Vibrator for MockBackend {
    fn start(&self, source: VibraSource<'_>) -> BackendResult<VibraStarted> {
        if let VibraSource::File(path) = source {
            if !self.vibra_files.lock().contains(Path::new(path)) {
                return Err(BackendError::FileNotFound(path.display().to_string()));
            }
        }
        self.record(BackendCall::VibraStart(source.to_string()));
        Ok(VibraStarted {
            id: VibraId::new(self.next_id()),
            repeating: self.vibra_repeating.load(Ordering::SeqCst),
        })
    }

    fn stop(&self, vibra: VibraId) {
        self.record(BackendCall::VibraStop(vibra));
    }

    fn is_completed(&self, _vibra: VibraId) -> bool {
        self.vibra_completed.load(Ordering::SeqCst)
    }
}

impl LedBackend for MockBackend {
    fn activate(&self, pattern: &str) -> BackendResult<LedId> {
        self.record(BackendCall::LedActivate(pattern.to_string()));
        Ok(LedId::new(self.next_id()))
    }

    fn deactivate(&self, led: LedId) {
        self.record(BackendCall::LedDeactivate(led));
    }
}

impl BacklightBackend for MockBackend {
    fn display_on(&self, unlock: bool) -> BackendResult<()> {
        self.record(BackendCall::DisplayOn { unlock });
        Ok(())
    }

    fn set_display(&self, on: bool) {
        self.record(BackendCall::SetDisplay(on));
    }

    fn release(&self) {
        self.record(BackendCall::BacklightRelease);
    }
}

/// A call made on [`MockSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCall {
    Prepare(RequestId),
    Play(RequestId),
    Pause(RequestId, bool),
    Stop(RequestId),
}

/// Records sink calls; synchronizes from `prepare` unless told otherwise
pub struct MockSink {
    name: String,
    accepts: AtomicBool,
    auto_sync: AtomicBool,
    fail_prepare: AtomicBool,
    fail_play: AtomicBool,
    calls: Mutex<Vec<SinkCall>>,
    handles: Mutex<Vec<SinkHandle>>,
}

impl MockSink {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            accepts: AtomicBool::new(true),
            auto_sync: AtomicBool::new(true),
            fail_prepare: AtomicBool::new(false),
            fail_play: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn set_accepts(&self, accepts: bool) {
        self.accepts.store(accepts, Ordering::SeqCst);
    }

    pub fn set_auto_sync(&self, auto_sync: bool) {
        self.auto_sync.store(auto_sync, Ordering::SeqCst);
    }

    pub fn set_fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn count<F: Fn(&SinkCall) -> bool>(&self, predicate: F) -> usize {
        self.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// The handle from the most recent `prepare`
    pub fn last_handle(&self) -> Option<SinkHandle> {
        self.handles.lock().last().cloned()
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

impl Sink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, _request: &Request) -> bool {
        self.accepts.load(Ordering::SeqCst)
    }

    fn prepare(&self, request: &mut Request, handle: SinkHandle) -> SinkResult<()> {
        self.record(SinkCall::Prepare(request.id));

        let rounds = request.take_data::<u32>(&self.name).unwrap_or(0) + 1;
        request.store_data(self.name.clone(), rounds);

        self.handles.lock().push(handle.clone());

        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(SinkError::Prepare {
                sink: self.name.clone(),
                message: "scripted failure".to_string(),
            });
        }
        if self.auto_sync.load(Ordering::SeqCst) {
            handle.synchronize();
        }
        Ok(())
    }

    fn play(&self, request: &mut Request) -> SinkResult<()> {
        self.record(SinkCall::Play(request.id));
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(SinkError::Play {
                sink: self.name.clone(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn pause(&self, request: &mut Request, paused: bool) {
        self.record(SinkCall::Pause(request.id, paused));
    }

    fn stop(&self, request: &mut Request) {
        self.record(SinkCall::Stop(request.id));
    }
}

/// Services wired to `mock` with the given context values
pub fn services(mock: &Arc<MockBackend>, manager: EventManager, context: Proplist) -> Services {
    let shared = Arc::new(Context::new());
    for (key, value) in &context {
        shared.set_value(key.clone(), value.clone());
    }
    Services::new(shared, manager).with_backends(mock.backends())
}

/// Deliver every queued signal for `event`; returns how many were handled
pub fn deliver_pending(rx: &mut SignalRx, event: &mut Event) -> usize {
    let mut delivered = 0;
    while let Ok((request, signal)) = rx.try_recv() {
        if request == event.id() {
            event.handle_signal(signal);
            delivered += 1;
        }
    }
    delivered
}
