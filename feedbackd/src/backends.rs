//! Simulated output backends
//!
//! Stand-ins for the real audio, vibration, LED, backlight and tone
//! generator services. Every call is logged; audio streams "play" for a
//! fixed time and finite vibration patterns complete after their configured
//! duration, so the daemon behaves end to end without hardware.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedback_core::{
    AudioBackend, AudioStream, BackendError, BackendResult, BacklightBackend, Backends,
    LedBackend, LedId, StreamId, StreamNotifier, StreamState, ToneGenerator, ToneId, VibraId,
    VibraSource, VibraStarted, Vibrator,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{DaemonConfig, VibraPatternConfig};

/// Every backend slot filled with a simulated implementation
pub fn simulated(config: &DaemonConfig) -> Backends {
    Backends::new()
        .with_audio(Arc::new(SimulatedAudio::new(config.simulated_stream_length())))
        .with_tonegen(Arc::new(SimulatedToneGenerator::default()))
        .with_vibrator(Arc::new(SimulatedVibrator::new(config.vibra_patterns.clone())))
        .with_led(Arc::new(SimulatedLed::default()))
        .with_backlight(Arc::new(SimulatedBacklight))
}

struct SimulatedStream {
    source: String,
    notifier: StreamNotifier,
    playback: Option<JoinHandle<()>>,
}

/// Audio streams that start at once and complete after `stream_length`
///
/// An absolute source path that does not exist fails the stream, which
/// exercises the fallback path. Other sources are treated as sound theme
/// names and always play.
pub struct SimulatedAudio {
    stream_length: Duration,
    streams: Mutex<HashMap<StreamId, SimulatedStream>>,
}

impl SimulatedAudio {
    pub fn new(stream_length: Duration) -> Self {
        Self {
            stream_length,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_streams(&self) -> usize {
        self.streams.lock().len()
    }
}

impl AudioBackend for SimulatedAudio {
    fn prepare(&self, stream: &AudioStream, notifier: StreamNotifier) -> BackendResult<()> {
        tracing::debug!(
            "audio: prepare {} for {} from {} (volume {:?})",
            stream.id,
            notifier.request(),
            stream.source,
            stream.volume
        );
        self.streams.lock().insert(
            stream.id,
            SimulatedStream {
                source: stream.source.clone(),
                notifier,
                playback: None,
            },
        );
        Ok(())
    }

    fn play(&self, id: StreamId) -> BackendResult<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| BackendError::Unavailable("audio"))?;

        let mut streams = self.streams.lock();
        let stream = streams.get_mut(&id).ok_or_else(|| BackendError::Operation {
            backend: "audio",
            operation: "play",
            message: format!("{} was not prepared", id),
        })?;

        let notifier = stream.notifier.clone();
        let path = Path::new(&stream.source);
        let missing = path.is_absolute() && !path.exists();
        let length = self.stream_length;

        tracing::info!("audio: playing {} ({})", id, stream.source);
        stream.playback = Some(runtime.spawn(async move {
            if missing {
                notifier.notify(StreamState::Failed);
                return;
            }
            notifier.notify(StreamState::Started);
            tokio::time::sleep(length).await;
            notifier.notify(StreamState::Completed);
        }));
        Ok(())
    }

    fn pause(&self, id: StreamId, paused: bool) -> BackendResult<()> {
        tracing::info!("audio: {} {}", if paused { "pause" } else { "resume" }, id);
        Ok(())
    }

    fn stop(&self, id: StreamId) {
        if let Some(stream) = self.streams.lock().remove(&id) {
            if let Some(playback) = stream.playback {
                playback.abort();
            }
            tracing::debug!("audio: stopped {}", id);
        }
    }

    fn set_volume(&self, id: StreamId, volume: i32) {
        tracing::debug!("audio: {} volume {}", id, volume);
    }
}

/// Tones play until stopped
#[derive(Default)]
pub struct SimulatedToneGenerator {
    next_id: AtomicU32,
}

impl ToneGenerator for SimulatedToneGenerator {
    fn start(&self, pattern: i32, volume: i32) -> BackendResult<ToneId> {
        let id = ToneId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!("tonegen: {} pattern {} volume {}", id, pattern, volume);
        Ok(id)
    }

    fn stop(&self, tone: ToneId) {
        tracing::info!("tonegen: stop {}", tone);
    }
}

struct RunningVibra {
    started: Instant,
    pattern: VibraPatternConfig,
}

/// Vibration patterns from the configuration; custom files must exist
pub struct SimulatedVibrator {
    patterns: BTreeMap<String, VibraPatternConfig>,
    running: Mutex<HashMap<VibraId, RunningVibra>>,
    next_id: AtomicU32,
}

impl SimulatedVibrator {
    pub fn new(patterns: BTreeMap<String, VibraPatternConfig>) -> Self {
        Self {
            patterns,
            running: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
        }
    }
}

impl Vibrator for SimulatedVibrator {
    fn start(&self, source: VibraSource<'_>) -> BackendResult<VibraStarted> {
        let pattern = match source {
            VibraSource::Pattern(name) => {
                self.patterns
                    .get(name)
                    .cloned()
                    .ok_or_else(|| BackendError::UnknownPattern {
                        backend: "vibra",
                        pattern: name.to_string(),
                    })?
            }
            VibraSource::File(path) => {
                if !path.exists() {
                    return Err(BackendError::FileNotFound(path.display().to_string()));
                }
                VibraPatternConfig::default()
            }
        };

        let id = VibraId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let repeating = pattern.repeating;
        tracing::info!("vibra: {} playing {}", id, source);
        self.running.lock().insert(
            id,
            RunningVibra {
                started: Instant::now(),
                pattern,
            },
        );

        Ok(VibraStarted { id, repeating })
    }

    fn stop(&self, vibra: VibraId) {
        if self.running.lock().remove(&vibra).is_some() {
            tracing::info!("vibra: stop {}", vibra);
        }
    }

    fn is_completed(&self, vibra: VibraId) -> bool {
        let mut running = self.running.lock();
        let Some(entry) = running.get(&vibra) else {
            return true;
        };
        if entry.pattern.repeating {
            return false;
        }

        let done = entry.started.elapsed() >= Duration::from_millis(entry.pattern.duration_ms);
        if done {
            running.remove(&vibra);
        }
        done
    }
}

#[derive(Default)]
pub struct SimulatedLed {
    next_id: AtomicU32,
}

impl LedBackend for SimulatedLed {
    fn activate(&self, pattern: &str) -> BackendResult<LedId> {
        let id = LedId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!("led: {} activate {}", id, pattern);
        Ok(id)
    }

    fn deactivate(&self, led: LedId) {
        tracing::info!("led: deactivate {}", led);
    }
}

pub struct SimulatedBacklight;

impl BacklightBackend for SimulatedBacklight {
    fn display_on(&self, unlock: bool) -> BackendResult<()> {
        tracing::info!("backlight: display on{}", if unlock { ", unlocked" } else { "" });
        Ok(())
    }

    fn set_display(&self, on: bool) {
        tracing::debug!("backlight: display {}", if on { "on" } else { "off" });
    }

    fn release(&self) {
        tracing::info!("backlight: released");
    }
}
