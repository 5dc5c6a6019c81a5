//! Well-known property and context keys
//!
//! Request properties, prototype defaults and context values all share the
//! same flat dotted key space. The constants here are the keys the core
//! itself reads; plugins are free to use any other key.

// Request dispatch
pub const PLAY_MODE: &str = "play.mode";
pub const POLICY_ID: &str = "policy.id";

// Resource flags granted by policy
pub const MEDIA_AUDIO: &str = "media.audio";
pub const MEDIA_VIBRA: &str = "media.vibra";
pub const MEDIA_LEDS: &str = "media.leds";
pub const MEDIA_BACKLIGHT: &str = "media.backlight";

// Audio
pub const AUDIO_ENABLED: &str = "audio.enabled";
pub const AUDIO: &str = "audio";
pub const AUDIO_TONE_PROFILE: &str = "audio.tone_profile";
pub const AUDIO_FALLBACK: &str = "audio.fallback";
pub const AUDIO_FALLBACK_PROFILE: &str = "audio.fallback_profile";
pub const AUDIO_VOLUME: &str = "audio.volume";
pub const AUDIO_VOLUME_PROFILE: &str = "audio.volume_profile";
pub const AUDIO_VOLUME_PATTERN: &str = "audio.volume_pattern";
pub const AUDIO_VOLUME_PATTERN_REPEAT: &str = "audio.volume_pattern_repeat";
pub const AUDIO_VOLUME_CONTROLLER: &str = "audio.volume_controller";
pub const AUDIO_REPEAT: &str = "audio.repeat";
pub const AUDIO_MAX_REPEATS: &str = "audio.max_repeats";

// Tone generator
pub const TONEGEN_ENABLED: &str = "tonegen.enabled";
pub const TONEGEN_PATTERN: &str = "tonegen.pattern";
pub const TONEGEN_VOLUME: &str = "tonegen.volume";

// Vibration
pub const VIBRA_ENABLED: &str = "vibra.enabled";
pub const VIBRA_PATTERN: &str = "vibra.pattern";
pub const VIBRA_CUSTOM_PATTERNS: &str = "vibra.custom_patterns";

// LED and backlight
pub const LED_PATTERN: &str = "led.pattern";
pub const BACKLIGHT_UNLOCK: &str = "backlight.unlock";
pub const BACKLIGHT_PATTERN: &str = "backlight.pattern";
pub const BACKLIGHT_PATTERN_REPEAT: &str = "backlight.pattern_repeat";

// Timing, in milliseconds
pub const MAX_LENGTH: &str = "max_length";
pub const MIN_LENGTH: &str = "min_length";

/// Context keys read by the core
pub mod context {
    /// Prefix under which profile values are published
    pub const PROFILE_PREFIX: &str = "profile.";
    pub const SILENT: &str = "profile.silent";
    pub const VIBRATION_ENABLED: &str = "profile.vibration_enabled";
}

/// Context key holding the profile value named `name`
pub fn profile_key(name: &str) -> String {
    format!("{}{}", context::PROFILE_PREFIX, name)
}
