//! Output backend contracts
//!
//! Concrete drivers (audio pipeline, vibrator, LED and backlight services,
//! tone generator) live outside the core and are injected as trait objects
//! through [`Backends`]. Every modality is optional; an absent backend
//! means that modality is skipped.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use feedback_store::Proplist;

use crate::error::BackendResult;
use crate::signal::{StreamId, StreamNotifier};

macro_rules! backend_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn new(id: u32) -> Self {
                Self(id)
            }

            pub fn as_u32(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

backend_id!(
    /// Handle of a running tone
    ToneId,
    "tone"
);
backend_id!(
    /// Handle of a running vibration
    VibraId,
    "vibra"
);
backend_id!(
    /// Handle of an active LED pattern
    LedId,
    "led"
);

/// Everything the audio backend needs to render one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStream {
    pub id: StreamId,
    /// Resolved source filename or URI
    pub source: String,
    /// Fixed volume, or `None` when a controller drives it
    pub volume: Option<i32>,
    /// Stream metadata from the prototype (role, restore id, ...)
    pub properties: Proplist,
}

/// Audio playback
///
/// The backend reports progress through the [`StreamNotifier`] handed to
/// `prepare`: `Started` once, then exactly one of `Completed` or `Failed`.
pub trait AudioBackend: Send + Sync {
    fn prepare(&self, stream: &AudioStream, notifier: StreamNotifier) -> BackendResult<()>;

    fn play(&self, stream: StreamId) -> BackendResult<()>;

    fn pause(&self, stream: StreamId, paused: bool) -> BackendResult<()>;

    /// Release the stream; unknown or already stopped streams are ignored
    fn stop(&self, stream: StreamId);

    fn set_volume(&self, stream: StreamId, volume: i32);
}

/// DTMF-like tone generator
pub trait ToneGenerator: Send + Sync {
    fn start(&self, pattern: i32, volume: i32) -> BackendResult<ToneId>;

    fn stop(&self, tone: ToneId);
}

/// What to vibrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibraSource<'a> {
    /// A pattern registered with the vibrator
    Pattern(&'a str),
    /// A custom effect file
    File(&'a Path),
}

impl fmt::Display for VibraSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VibraSource::Pattern(name) => write!(f, "pattern {}", name),
            VibraSource::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Result of starting a vibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VibraStarted {
    pub id: VibraId,
    /// Repeating effects never complete on their own
    pub repeating: bool,
}

/// Vibration motor
///
/// The vibrator offers no completion callback; callers that need to know
/// when a finite effect ended poll [`Vibrator::is_completed`].
pub trait Vibrator: Send + Sync {
    /// Start an effect; fails with `FileNotFound` for a missing custom file
    fn start(&self, source: VibraSource<'_>) -> BackendResult<VibraStarted>;

    fn stop(&self, vibra: VibraId);

    fn is_completed(&self, vibra: VibraId) -> bool;
}

/// Notification LEDs
pub trait LedBackend: Send + Sync {
    fn activate(&self, pattern: &str) -> BackendResult<LedId>;

    fn deactivate(&self, led: LedId);
}

/// Display backlight
pub trait BacklightBackend: Send + Sync {
    /// Turn the display on, optionally unlocking the screen
    fn display_on(&self, unlock: bool) -> BackendResult<()>;

    /// Switch the display on or off (driven by backlight patterns)
    fn set_display(&self, on: bool);

    /// Give display control back to the system
    fn release(&self);
}

/// The backends available to Events
#[derive(Clone, Default)]
pub struct Backends {
    pub audio: Option<Arc<dyn AudioBackend>>,
    pub tonegen: Option<Arc<dyn ToneGenerator>>,
    pub vibrator: Option<Arc<dyn Vibrator>>,
    pub led: Option<Arc<dyn LedBackend>>,
    pub backlight: Option<Arc<dyn BacklightBackend>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioBackend>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_tonegen(mut self, tonegen: Arc<dyn ToneGenerator>) -> Self {
        self.tonegen = Some(tonegen);
        self
    }

    pub fn with_vibrator(mut self, vibrator: Arc<dyn Vibrator>) -> Self {
        self.vibrator = Some(vibrator);
        self
    }

    pub fn with_led(mut self, led: Arc<dyn LedBackend>) -> Self {
        self.led = Some(led);
        self
    }

    pub fn with_backlight(mut self, backlight: Arc<dyn BacklightBackend>) -> Self {
        self.backlight = Some(backlight);
        self
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("audio", &self.audio.is_some())
            .field("tonegen", &self.tonegen.is_some())
            .field("vibrator", &self.vibrator.is_some())
            .field("led", &self.led.is_some())
            .field("backlight", &self.backlight.is_some())
            .finish()
    }
}
