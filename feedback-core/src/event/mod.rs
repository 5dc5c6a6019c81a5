//! The per-request Event state machine
//!
//! An Event turns one accepted play request into running output resources
//! and follows them until the first terminal signal:
//!
//! ```text
//! Created ──start──▶ Starting ──▶ Active ──┬──▶ Completed
//!                                           ├──▶ Failed
//!                                           └──▶ Stopped
//! ```
//!
//! `start` copies the prototype defaults, applies the allowed client
//! overrides, runs the transform-properties hook and then sets up each
//! granted modality in a fixed order: tone generator or audio, vibration,
//! LEDs, backlight, then plugin sinks. Setup failures skip the affected
//! modality and never fail the Event.
//!
//! Everything asynchronous (stream state, timers, sink callbacks) arrives
//! through [`Event::handle_signal`]. The first terminal signal of any
//! engaged modality ends the whole Event; vibration, LEDs and backlight are
//! not waited on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use feedback_store::{Proplist, Value};
use tokio::time::Instant;

use crate::backend::{AudioStream, LedId, ToneId, VibraId, VibraSource, VibraStarted};
use crate::controller::{Controller, RunningController};
use crate::definition::{EventPrototype, PlayMode};
use crate::error::EventError;
use crate::keys::{self, profile_key};
use crate::request::{Request, RequestId, Resources};
use crate::services::Services;
use crate::signal::{
    Signal, SignalSender, SignalTx, SinkSignal, StreamId, StreamNotifier, StreamState, TimerKind,
};
use crate::sink::{Sink, SinkHandle};
use crate::timer::Timer;


/// Lifecycle state of an Event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Created,
    Starting,
    Active,
    Completed,
    Failed,
    Stopped,
}

impl EventState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventState::Completed | EventState::Failed | EventState::Stopped
        )
    }
}

/// Status reported through the Event callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    /// Rendering started; reported at most once
    Started,
    Completed,
    Failed,
    Stopped,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Started)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventStatus::Started => "started",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
            EventStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Dispatch decisions made before the Event was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOptions {
    pub play_mode: PlayMode,
    pub policy_id: u32,
    pub resources: Resources,
}

type StatusCallback = Box<dyn FnMut(RequestId, EventStatus) + Send>;

enum VolumePlan {
    Backend,
    Fixed(i32),
    Controlled(Arc<Controller>),
}

struct EngagedSink {
    sink: Arc<dyn Sink>,
    synchronized: bool,
}

/// One in-flight feedback request
pub struct Event {
    id: RequestId,
    prototype: Arc<EventPrototype>,
    options: EventOptions,
    services: Arc<Services>,
    signals: SignalTx,
    request: Request,
    state: EventState,
    callback: Option<StatusCallback>,
    started_reported: bool,
    started_at: Option<Instant>,

    // Audio
    tone: Option<ToneId>,
    stream: Option<StreamId>,
    current_source: Option<String>,
    volume_controller: Option<RunningController>,
    fallback_in_use: bool,
    repeat_count: u32,

    // Vibration, LEDs, backlight
    vibra: Option<VibraId>,
    vibra_poll: Option<Timer>,
    led: Option<LedId>,
    backlight_on: bool,
    backlight_controller: Option<RunningController>,

    // Plugin sinks
    sinks: Vec<EngagedSink>,
    sink_generation: u64,
    sinks_playing: bool,

    // Timers
    max_length: Option<Timer>,
    deferred_stop: Option<Timer>,
    timer_generation: u64,
}

impl Event {
    /// Create an Event for `request`
    ///
    /// The request keeps its name, id and per-sink data; its properties are
    /// replaced by the resolved ones when the Event starts.
    pub fn new(
        request: Request,
        prototype: Arc<EventPrototype>,
        options: EventOptions,
        services: Arc<Services>,
        signals: SignalTx,
    ) -> Self {
        Self {
            id: request.id,
            prototype,
            options,
            services,
            signals,
            request,
            state: EventState::Created,
            callback: None,
            started_reported: false,
            started_at: None,
            tone: None,
            stream: None,
            current_source: None,
            volume_controller: None,
            fallback_in_use: false,
            repeat_count: 0,
            vibra: None,
            vibra_poll: None,
            led: None,
            backlight_on: false,
            backlight_controller: None,
            sinks: Vec::new(),
            sink_generation: 0,
            sinks_playing: false,
            max_length: None,
            deferred_stop: None,
            timer_generation: 0,
        }
    }

    /// Set the status callback
    ///
    /// Terminal statuses are reported exactly once. A plain [`Event::stop`]
    /// reports nothing; use [`Event::request_stop`] for a reported stop.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(RequestId, EventStatus) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.request.name
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn options(&self) -> &EventOptions {
        &self.options
    }

    pub fn prototype(&self) -> &Arc<EventPrototype> {
        &self.prototype
    }

    /// The live, merged properties
    pub fn properties(&self) -> &Proplist {
        &self.request.properties
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    pub fn current_source(&self) -> Option<&str> {
        self.current_source.as_deref()
    }

    pub fn fallback_in_use(&self) -> bool {
        self.fallback_in_use
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn tone(&self) -> Option<ToneId> {
        self.tone
    }

    pub fn vibra(&self) -> Option<VibraId> {
        self.vibra
    }

    pub fn led(&self) -> Option<LedId> {
        self.led
    }

    pub fn backlight_active(&self) -> bool {
        self.backlight_on || self.backlight_controller.is_some()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks
            .iter()
            .map(|s| s.sink.name().to_string())
            .collect()
    }

    pub fn timer_generation(&self) -> u64 {
        self.timer_generation
    }

    /// Time since `start`, if started
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    fn sender(&self) -> SignalSender {
        SignalSender::new(self.id, self.signals.clone())
    }

    /// Resolve properties and set up every granted modality
    pub fn start(&mut self, overrides: &Proplist) -> Result<(), EventError> {
        if self.state != EventState::Created {
            return Err(EventError::AlreadyStarted(self.id.to_string()));
        }
        self.state = EventState::Starting;

        tracing::debug!(
            request = %self.id,
            "Starting {} with prototype {} ({}, {}, policy {})",
            self.request.name,
            self.prototype.name,
            self.options.play_mode,
            self.options.resources,
            self.options.policy_id
        );

        self.request.properties = self.prototype.properties.clone();
        if self.prototype.disallow_override {
            if !overrides.is_empty() {
                tracing::debug!(request = %self.id, "Prototype disallows overrides, ignoring {} properties", overrides.len());
            }
        } else {
            self.request
                .properties
                .merge_allowed(overrides, &self.prototype.allowed_keys);
        }

        let services = Arc::clone(&self.services);
        services.hooks.transform_properties.fire(&mut self.request);
        self.request.properties.dump("Event properties");

        let resources = self.options.resources;
        if resources.audio && self.request.properties.get_bool_or(keys::AUDIO_ENABLED, true) {
            if !self.start_tonegen() {
                self.start_audio();
            }
        }
        if resources.vibra {
            self.start_vibra();
        }
        if resources.leds {
            self.start_led();
        }
        if resources.backlight {
            self.start_backlight();
        }
        self.start_sinks();

        let max_length = self.request.properties.get_int(keys::MAX_LENGTH);
        if max_length > 0 {
            self.max_length = Timer::once(
                Duration::from_millis(max_length as u64),
                self.sender(),
                TimerKind::MaxLength,
                self.timer_generation,
            );
        }

        self.started_at = Some(Instant::now());
        self.state = EventState::Active;

        if !self.is_engaged() {
            tracing::debug!(request = %self.id, "Nothing to render");
            self.finish(EventStatus::Completed);
        }

        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.tone.is_some()
            || self.stream.is_some()
            || self.vibra.is_some()
            || self.led.is_some()
            || self.backlight_active()
            || !self.sinks.is_empty()
    }

    // ---------------------------------------------------------------------
    // Audio
    // ---------------------------------------------------------------------

    fn start_tonegen(&mut self) -> bool {
        let props = &self.request.properties;
        if !props.get_bool(keys::TONEGEN_ENABLED) {
            return false;
        }
        let Some(tonegen) = self.services.backends.tonegen.clone() else {
            tracing::debug!(request = %self.id, "Tone generator requested but not available");
            return false;
        };

        let pattern = props.get_int(keys::TONEGEN_PATTERN);
        let volume = props.get_int(keys::TONEGEN_VOLUME);
        match tonegen.start(pattern, volume) {
            Ok(tone) => {
                tracing::debug!(request = %self.id, "Started {} (pattern {})", tone, pattern);
                self.tone = Some(tone);
                true
            }
            Err(e) => {
                tracing::warn!(request = %self.id, "Tone generator failed: {}", e);
                false
            }
        }
    }

    fn start_audio(&mut self) -> bool {
        if self.services.backends.audio.is_none() {
            tracing::debug!(request = %self.id, "No audio backend, skipping audio");
            return false;
        }

        let source = match self.resolve_source(keys::AUDIO, keys::AUDIO_TONE_PROFILE) {
            Some(source) => source,
            None => {
                self.fallback_in_use = true;
                match self.resolve_source(keys::AUDIO_FALLBACK, keys::AUDIO_FALLBACK_PROFILE) {
                    Some(source) => source,
                    None => {
                        tracing::debug!(request = %self.id, "No audio source, skipping audio");
                        return false;
                    }
                }
            }
        };

        self.start_stream(source)
    }

    /// A filename property, or a profile key resolving to one
    fn resolve_source(&self, file_key: &str, profile_key_name: &str) -> Option<String> {
        let props = &self.request.properties;
        if let Some(file) = props.get_non_empty(file_key) {
            return Some(file.to_string());
        }

        let profile = props.get_non_empty(profile_key_name)?;
        self.services
            .context
            .get_string(&profile_key(profile))
            .filter(|s| !s.is_empty())
    }

    /// Volume precedence: inline pattern, named controller, explicit value,
    /// profile value
    fn resolve_volume(&self) -> VolumePlan {
        let props = &self.request.properties;

        if let Some(pattern) = props.get_non_empty(keys::AUDIO_VOLUME_PATTERN) {
            let repeat = props.get_bool(keys::AUDIO_VOLUME_PATTERN_REPEAT);
            match Controller::from_pattern(pattern, repeat) {
                Ok(controller) => return VolumePlan::Controlled(Arc::new(controller)),
                Err(e) => tracing::warn!(request = %self.id, "Ignoring volume pattern: {}", e),
            }
        }

        if let Some(name) = props.get_non_empty(keys::AUDIO_VOLUME_CONTROLLER) {
            match self.services.manager.controller(name) {
                Some(controller) => return VolumePlan::Controlled(controller),
                None => tracing::warn!(request = %self.id, "Unknown volume controller {}", name),
            }
        }

        if let Some(volume) = props.get(keys::AUDIO_VOLUME).and_then(Value::as_int) {
            return VolumePlan::Fixed(volume);
        }

        if let Some(profile) = props.get_non_empty(keys::AUDIO_VOLUME_PROFILE) {
            if let Some(volume) = self.services.context.get_int(&profile_key(profile)) {
                return VolumePlan::Fixed(volume);
            }
        }

        VolumePlan::Backend
    }

    fn start_stream(&mut self, source: String) -> bool {
        let Some(audio) = self.services.backends.audio.clone() else {
            return false;
        };

        let volume = self.resolve_volume();
        let id = self.services.next_stream_id();
        let stream = AudioStream {
            id,
            source: source.clone(),
            volume: match volume {
                VolumePlan::Fixed(v) => Some(v),
                _ => None,
            },
            properties: self.prototype.stream_properties.clone(),
        };

        let notifier = StreamNotifier::new(self.sender(), id);
        if let Err(e) = audio.prepare(&stream, notifier) {
            tracing::warn!(request = %self.id, "Failed to prepare {} for {}: {}", id, source, e);
            audio.stop(id);
            return false;
        }

        self.stream = Some(id);
        self.current_source = Some(source);

        if let VolumePlan::Controlled(controller) = volume {
            let backend = Arc::clone(&audio);
            self.volume_controller = controller.spawn(move |_, _, value| {
                backend.set_volume(id, i32::try_from(value).unwrap_or(i32::MAX));
                true
            });
        }

        if let Err(e) = audio.play(id) {
            tracing::warn!(request = %self.id, "Failed to play {}: {}", id, e);
            self.teardown_stream();
            return false;
        }

        tracing::debug!(
            request = %self.id,
            "Playing {} from {}{}",
            id,
            self.current_source.as_deref().unwrap_or_default(),
            if self.fallback_in_use { " (fallback)" } else { "" }
        );
        true
    }

    fn teardown_stream(&mut self) {
        self.volume_controller = None;
        if let Some(id) = self.stream.take() {
            if let Some(audio) = &self.services.backends.audio {
                audio.stop(id);
            }
        }
    }

    fn handle_stream_state(&mut self, stream: StreamId, state: StreamState) {
        if self.stream != Some(stream) {
            tracing::trace!(request = %self.id, "Ignoring {:?} from stale {}", state, stream);
            return;
        }

        match state {
            StreamState::Started => {
                tracing::debug!(request = %self.id, "{} started", stream);
                self.report_started();
            }
            StreamState::Failed => {
                self.teardown_stream();
                if self.fallback_in_use {
                    tracing::warn!(request = %self.id, "Fallback {} failed", stream);
                    self.finish(EventStatus::Failed);
                    return;
                }

                self.fallback_in_use = true;
                let fallback =
                    self.resolve_source(keys::AUDIO_FALLBACK, keys::AUDIO_FALLBACK_PROFILE);
                match fallback {
                    Some(source) => {
                        tracing::info!(request = %self.id, "{} failed, retrying with fallback {}", stream, source);
                        if !self.start_stream(source) {
                            self.finish(EventStatus::Failed);
                        }
                    }
                    None => {
                        tracing::warn!(request = %self.id, "{} failed and no fallback is configured", stream);
                        self.finish(EventStatus::Failed);
                    }
                }
            }
            StreamState::Completed => {
                self.teardown_stream();

                let props = &self.request.properties;
                let repeat = props.get_bool(keys::AUDIO_REPEAT);
                let max_repeats = props.get_int(keys::AUDIO_MAX_REPEATS).max(0) as u32;

                if repeat && (max_repeats == 0 || self.repeat_count < max_repeats) {
                    self.repeat_count += 1;
                    tracing::debug!(request = %self.id, "Repeating audio ({}/{})", self.repeat_count, max_repeats);

                    let restarted = match self.current_source.clone() {
                        Some(source) => self.start_stream(source),
                        None => false,
                    };
                    if !restarted {
                        self.finish(EventStatus::Completed);
                    }
                } else {
                    self.finish(EventStatus::Completed);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Vibration, LEDs, backlight
    // ---------------------------------------------------------------------

    fn start_vibra(&mut self) {
        let Some(vibrator) = self.services.backends.vibrator.clone() else {
            tracing::debug!(request = %self.id, "No vibrator, skipping vibration");
            return;
        };

        let context = &self.services.context;
        let props = &self.request.properties;
        if !context.get_bool(keys::context::VIBRATION_ENABLED).unwrap_or(true)
            || !props.get_bool_or(keys::VIBRA_ENABLED, true)
        {
            tracing::debug!(request = %self.id, "Vibration disabled");
            return;
        }

        let mut started: Option<VibraStarted> = None;

        if props.get_bool(keys::VIBRA_CUSTOM_PATTERNS) {
            let audio_source = self
                .current_source
                .clone()
                .or_else(|| self.resolve_source(keys::AUDIO, keys::AUDIO_TONE_PROFILE));
            if let Some(source) = audio_source {
                let path = std::path::Path::new(&source).with_extension("ivt");
                match vibrator.start(VibraSource::File(&path)) {
                    Ok(result) => started = Some(result),
                    Err(e) => tracing::debug!(request = %self.id, "No custom vibration: {}", e),
                }
            }
        }

        if started.is_none() {
            if let Some(pattern) = props.get_non_empty(keys::VIBRA_PATTERN) {
                match vibrator.start(VibraSource::Pattern(pattern)) {
                    Ok(result) => started = Some(result),
                    Err(e) => tracing::warn!(request = %self.id, "Vibration failed: {}", e),
                }
            }
        }

        let Some(started) = started else {
            return;
        };
        tracing::debug!(request = %self.id, "Started {}", started.id);
        self.vibra = Some(started.id);

        let silent = self
            .services
            .context
            .get_bool(keys::context::SILENT)
            .unwrap_or(false);
        if silent && !started.repeating {
            self.vibra_poll = Timer::repeating(
                self.services.config.vibra_poll_interval,
                self.sender(),
                TimerKind::VibraPoll,
                self.timer_generation,
            );
        }
    }

    fn start_led(&mut self) {
        let Some(led) = self.services.backends.led.clone() else {
            tracing::debug!(request = %self.id, "No LED backend, skipping LEDs");
            return;
        };
        let Some(pattern) = self.request.properties.get_non_empty(keys::LED_PATTERN) else {
            return;
        };

        match led.activate(pattern) {
            Ok(id) => {
                tracing::debug!(request = %self.id, "Activated {} ({})", id, pattern);
                self.led = Some(id);
            }
            Err(e) => tracing::warn!(request = %self.id, "LED pattern failed: {}", e),
        }
    }

    fn start_backlight(&mut self) {
        let Some(backlight) = self.services.backends.backlight.clone() else {
            tracing::debug!(request = %self.id, "No backlight backend, skipping backlight");
            return;
        };
        let props = &self.request.properties;

        if let Some(pattern) = props.get_non_empty(keys::BACKLIGHT_PATTERN) {
            let repeat = props.get_bool(keys::BACKLIGHT_PATTERN_REPEAT);
            match Controller::from_pattern(pattern, repeat) {
                Ok(controller) => {
                    let backend = Arc::clone(&backlight);
                    self.backlight_controller =
                        Arc::new(controller).spawn(move |_, _, value| {
                            backend.set_display(value != 0);
                            true
                        });
                    return;
                }
                Err(e) => tracing::warn!(request = %self.id, "Ignoring backlight pattern: {}", e),
            }
        }

        let unlock = props.get_bool(keys::BACKLIGHT_UNLOCK);
        match backlight.display_on(unlock) {
            Ok(()) => self.backlight_on = true,
            Err(e) => tracing::warn!(request = %self.id, "Backlight failed: {}", e),
        }
    }

    // ---------------------------------------------------------------------
    // Sinks
    // ---------------------------------------------------------------------

    fn start_sinks(&mut self) {
        let candidates: Vec<Arc<dyn Sink>> = self
            .services
            .sinks
            .all()
            .into_iter()
            .filter(|sink| sink.can_handle(&self.request))
            .collect();
        if candidates.is_empty() {
            return;
        }

        let mut filter = crate::hook::FilterSinks {
            request_id: self.id,
            event_name: self.request.name.clone(),
            properties: self.request.properties.clone(),
            sinks: candidates.iter().map(|s| s.name().to_string()).collect(),
        };
        self.services.hooks.filter_sinks.fire(&mut filter);

        self.sinks = candidates
            .into_iter()
            .filter(|sink| filter.sinks.iter().any(|name| name == sink.name()))
            .map(|sink| EngagedSink {
                sink,
                synchronized: false,
            })
            .collect();

        if !self.sinks.is_empty() {
            tracing::debug!(request = %self.id, "Engaging sinks {:?}", self.sink_names());
            self.prepare_sinks();
        }
    }

    /// Start a new prepare round for every engaged sink
    fn prepare_sinks(&mut self) {
        self.sink_generation += 1;
        self.sinks_playing = false;

        let sender = self.sender();
        let generation = self.sink_generation;
        let mut failed = Vec::new();

        for engaged in self.sinks.iter_mut() {
            engaged.synchronized = false;
            let handle = SinkHandle::new(sender.clone(), engaged.sink.name(), generation);
            if let Err(e) = engaged.sink.prepare(&mut self.request, handle) {
                tracing::warn!(request = %self.id, sink = engaged.sink.name(), "{}", e);
                failed.push(engaged.sink.name().to_string());
            }
        }

        self.fail_sinks(failed);
    }

    fn play_sinks_if_ready(&mut self) {
        if self.sinks_playing
            || self.sinks.is_empty()
            || !self.sinks.iter().all(|s| s.synchronized)
        {
            return;
        }
        self.sinks_playing = true;

        let mut failed = Vec::new();
        for engaged in &self.sinks {
            if let Err(e) = engaged.sink.play(&mut self.request) {
                tracing::warn!(request = %self.id, sink = engaged.sink.name(), "{}", e);
                failed.push(engaged.sink.name().to_string());
            }
        }

        if !self.fail_sinks(failed) && !self.sinks.is_empty() {
            tracing::debug!(request = %self.id, "Sinks playing");
            self.report_started();
        }
    }

    /// Stop and drop the named sinks; returns whether the Event finished
    fn fail_sinks(&mut self, names: Vec<String>) -> bool {
        if names.is_empty() {
            return false;
        }

        for name in &names {
            if let Some(pos) = self.sinks.iter().position(|s| s.sink.name() == name) {
                let engaged = self.sinks.remove(pos);
                engaged.sink.stop(&mut self.request);
            }
        }

        if self.state == EventState::Active
            && self.sinks.is_empty()
            && self.stream.is_none()
            && self.tone.is_none()
        {
            tracing::warn!(request = %self.id, "No sink or audio left");
            self.finish(EventStatus::Failed);
            return true;
        }

        false
    }

    fn stop_sinks(&mut self) {
        for engaged in &self.sinks {
            engaged.sink.stop(&mut self.request);
        }
    }

    fn handle_sink_signal(&mut self, sink: &str, generation: u64, signal: SinkSignal) {
        if generation != self.sink_generation {
            tracing::trace!(request = %self.id, sink, "Ignoring {:?} from generation {}", signal, generation);
            return;
        }
        let Some(index) = self.sinks.iter().position(|s| s.sink.name() == sink) else {
            tracing::trace!(request = %self.id, sink, "Ignoring {:?} from unknown sink", signal);
            return;
        };

        match signal {
            SinkSignal::Synchronized => {
                self.sinks[index].synchronized = true;
                self.play_sinks_if_ready();
            }
            SinkSignal::Resync => {
                tracing::debug!(request = %self.id, sink, "Resynchronizing sinks");
                self.stop_sinks();
                self.prepare_sinks();
            }
            SinkSignal::Completed => {
                tracing::debug!(request = %self.id, sink, "Sink completed");
                self.finish(EventStatus::Completed);
            }
            SinkSignal::Failed => {
                tracing::warn!(request = %self.id, sink, "Sink failed");
                if !self.fail_sinks(vec![sink.to_string()]) {
                    self.play_sinks_if_ready();
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Signals, timers, stop
    // ---------------------------------------------------------------------

    /// React to an asynchronous signal addressed to this Event
    ///
    /// Signals for a finished Event, a replaced stream, a cancelled timer
    /// or an earlier sink round are ignored.
    pub fn handle_signal(&mut self, signal: Signal) {
        if self.state.is_terminal() {
            tracing::trace!(request = %self.id, "Ignoring {:?} after {:?}", signal, self.state);
            return;
        }

        match signal {
            Signal::Audio { stream, state } => self.handle_stream_state(stream, state),
            Signal::Timer { kind, generation } => self.handle_timer(kind, generation),
            Signal::Sink {
                sink,
                generation,
                signal,
            } => self.handle_sink_signal(&sink, generation, signal),
        }
    }

    fn handle_timer(&mut self, kind: TimerKind, generation: u64) {
        if generation != self.timer_generation {
            tracing::trace!(request = %self.id, "Ignoring stale {:?} timer", kind);
            return;
        }

        match kind {
            TimerKind::MaxLength => {
                tracing::debug!(request = %self.id, "Maximum length reached");
                self.max_length = None;
                self.finish(EventStatus::Completed);
            }
            TimerKind::VibraPoll => {
                let completed = match (self.vibra, &self.services.backends.vibrator) {
                    (Some(id), Some(vibrator)) => vibrator.is_completed(id),
                    _ => true,
                };
                if completed {
                    tracing::debug!(request = %self.id, "Vibration completed");
                    self.vibra = None;
                    self.vibra_poll = None;
                    self.finish(EventStatus::Completed);
                }
            }
            TimerKind::DeferredStop => {
                self.deferred_stop = None;
                self.finish(EventStatus::Stopped);
            }
        }
    }

    /// Pause or resume the audio stream and every sink
    pub fn pause(&mut self, paused: bool) {
        if self.state != EventState::Active {
            return;
        }

        if let (Some(stream), Some(audio)) = (self.stream, &self.services.backends.audio) {
            if let Err(e) = audio.pause(stream, paused) {
                tracing::warn!(request = %self.id, "Failed to pause {}: {}", stream, e);
            }
        }
        for engaged in &self.sinks {
            engaged.sink.pause(&mut self.request, paused);
        }

        tracing::debug!(request = %self.id, "{}", if paused { "Paused" } else { "Resumed" });
    }

    /// Client stop that honours `min_length`
    ///
    /// If the Event has played for less than `min_length` milliseconds the
    /// stop is deferred until that time has passed. Either way the Event
    /// ends with [`EventStatus::Stopped`] reported through the callback.
    pub fn request_stop(&mut self) {
        if self.state.is_terminal() || self.deferred_stop.is_some() {
            return;
        }

        let min_length = self.request.properties.get_int(keys::MIN_LENGTH);
        if let (true, Some(elapsed)) = (min_length > 0, self.elapsed()) {
            let minimum = Duration::from_millis(min_length as u64);
            if elapsed < minimum {
                let remaining = minimum - elapsed;
                self.deferred_stop = Timer::once(
                    remaining,
                    self.sender(),
                    TimerKind::DeferredStop,
                    self.timer_generation,
                );
                if self.deferred_stop.is_some() {
                    tracing::debug!(request = %self.id, "Deferring stop by {:?}", remaining);
                    return;
                }
            }
        }

        self.finish(EventStatus::Stopped);
    }

    /// Release every resource without reporting a status
    ///
    /// Idempotent; also run when the Event is dropped.
    pub fn stop(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(request = %self.id, "Stopping {}", self.request.name);
            self.state = EventState::Stopped;
        }
        self.release();
    }

    fn release(&mut self) {
        // Cancel timers first; bumping the generation invalidates signals
        // that were queued before the tasks were aborted
        self.timer_generation += 1;
        self.max_length = None;
        self.vibra_poll = None;
        self.deferred_stop = None;

        let backends = self.services.backends.clone();

        if let Some(tone) = self.tone.take() {
            if let Some(tonegen) = &backends.tonegen {
                tonegen.stop(tone);
            }
        }

        self.teardown_stream();

        if let Some(vibra) = self.vibra.take() {
            if let Some(vibrator) = &backends.vibrator {
                vibrator.stop(vibra);
            }
        }

        if let Some(led) = self.led.take() {
            if let Some(backend) = &backends.led {
                backend.deactivate(led);
            }
        }

        let had_controller = self.backlight_controller.take().is_some();
        if had_controller || self.backlight_on {
            self.backlight_on = false;
            if let Some(backlight) = &backends.backlight {
                backlight.release();
            }
        }

        let sinks = std::mem::take(&mut self.sinks);
        for engaged in sinks {
            engaged.sink.stop(&mut self.request);
        }
        self.sinks_playing = false;
    }

    fn finish(&mut self, status: EventStatus) {
        if self.state.is_terminal() {
            return;
        }

        self.release();
        self.state = match status {
            EventStatus::Completed => EventState::Completed,
            EventStatus::Failed => EventState::Failed,
            _ => EventState::Stopped,
        };

        tracing::info!(request = %self.id, "Event {} {}", self.request.name, status);
        self.notify(status);
    }

    fn report_started(&mut self) {
        if !self.started_reported {
            self.started_reported = true;
            self.notify(EventStatus::Started);
        }
    }

    fn notify(&mut self, status: EventStatus) {
        if let Some(callback) = self.callback.as_mut() {
            callback(self.id, status);
        }
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("name", &self.request.name)
            .field("prototype", &self.prototype.name)
            .field("state", &self.state)
            .field("stream", &self.stream)
            .field("repeat_count", &self.repeat_count)
            .field("fallback_in_use", &self.fallback_in_use)
            .field("sinks", &self.sink_names())
            .finish()
    }
}
