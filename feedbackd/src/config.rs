//! Daemon configuration
//!
//! The event table (definitions, prototypes, controllers), the initial
//! context values and the tunables of the simulated backends. Loaded from a
//! JSON file; property values use the tagged form `{"string": "..."}`,
//! `{"int": 5}`, `{"bool": true}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use feedback_core::{Controller, CoreConfig, EventDefinition, EventManager, EventPrototype};
use feedback_store::{Proplist, Value};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Long and short prototype names of one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefinitionConfig {
    pub long: Option<String>,
    pub short: Option<String>,
}

/// One prototype: default properties plus the override policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrototypeConfig {
    pub properties: Proplist,
    /// Metadata attached to the audio stream
    pub stream: Proplist,
    pub allowed_keys: Vec<String>,
    pub disallow_override: bool,
}

impl PrototypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.set(key, value);
        self
    }

    pub fn with_allowed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disallow_override(mut self, disallow: bool) -> Self {
        self.disallow_override = disallow;
        self
    }
}

/// A named controller template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// `"time=value;time=value"`, times in milliseconds
    pub pattern: String,
    pub repeat: bool,
}

/// A vibration pattern known to the simulated vibrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VibraPatternConfig {
    /// How long one run of the pattern lasts
    /// Default: 1000
    pub duration_ms: u64,
    /// Repeating patterns never complete on their own
    /// Default: false
    pub repeating: bool,
}

impl Default for VibraPatternConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            repeating: false,
        }
    }
}

/// Configuration for the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Period of the vibration completion poll in silent mode
    /// Default: 500
    pub vibra_poll_interval_ms: u64,

    /// How long a simulated audio stream plays
    /// Default: 3000
    pub simulated_stream_ms: u64,

    /// Values seeded into the context at startup
    pub context: Proplist,

    pub definitions: BTreeMap<String, DefinitionConfig>,

    pub prototypes: BTreeMap<String, PrototypeConfig>,

    pub controllers: BTreeMap<String, ControllerConfig>,

    pub vibra_patterns: BTreeMap<String, VibraPatternConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            vibra_poll_interval_ms: 500,
            simulated_stream_ms: 3000,
            context: Proplist::new(),
            definitions: BTreeMap::new(),
            prototypes: BTreeMap::new(),
            controllers: BTreeMap::new(),
            vibra_patterns: BTreeMap::new(),
        }
    }
}

impl DaemonConfig {
    /// Create a new DaemonConfig with default values and an empty event table
    pub fn new() -> Self {
        Self::default()
    }

    /// A small built-in event table used when no configuration file exists
    pub fn builtin() -> Self {
        Self::new()
            .with_context_value("profile.ringing.alert.tone", Value::from("ringtone.ogg"))
            .with_context_value("profile.ringing.alert.volume", Value::Int(80))
            .with_context_value("profile.sms.alert.tone", Value::from("message.ogg"))
            .with_context_value("profile.silent", Value::Bool(false))
            .with_context_value("profile.vibration_enabled", Value::Bool(true))
            .with_controller("ascending", "0=20;1000=40;2000=60;3000=80", false)
            .with_vibra_pattern("PatternIncomingCall", 1000, true)
            .with_vibra_pattern("PatternIncomingMessage", 400, false)
            .with_vibra_pattern("PatternTouchscreen", 50, false)
            .with_definition("ringtone", Some("ringtone_long"), Some("ringtone_short"))
            .with_definition("sms", Some("sms_long"), Some("sms_short"))
            .with_definition("touch", None, Some("touch_short"))
            .with_prototype(
                "ringtone_long",
                PrototypeConfig::new()
                    .with_property("audio.tone_profile", "ringing.alert.tone")
                    .with_property("audio.fallback", "fallback-ringtone.ogg")
                    .with_property("audio.volume_controller", "ascending")
                    .with_property("audio.repeat", true)
                    .with_property("vibra.pattern", "PatternIncomingCall")
                    .with_property("led.pattern", "PatternCommunicationCall")
                    .with_property("backlight.unlock", false)
                    .with_allowed_keys(["audio", "audio.volume", "max_length"]),
            )
            .with_prototype(
                "ringtone_short",
                PrototypeConfig::new()
                    .with_property("audio.tone_profile", "ringing.alert.tone")
                    .with_property("audio.volume_profile", "ringing.alert.volume")
                    .with_property("max_length", 1500),
            )
            .with_prototype(
                "sms_long",
                PrototypeConfig::new()
                    .with_property("audio.tone_profile", "sms.alert.tone")
                    .with_property("vibra.pattern", "PatternIncomingMessage")
                    .with_property("led.pattern", "PatternCommunicationSMS")
                    .with_property("min_length", 500),
            )
            .with_prototype(
                "sms_short",
                PrototypeConfig::new()
                    .with_property("audio.tone_profile", "sms.alert.tone")
                    .with_property("vibra.pattern", "PatternIncomingMessage"),
            )
            .with_prototype(
                "touch_short",
                PrototypeConfig::new()
                    .with_property("vibra.pattern", "PatternTouchscreen")
                    .with_disallow_override(true),
            )
    }

    pub fn with_vibra_poll_interval_ms(mut self, ms: u64) -> Self {
        self.vibra_poll_interval_ms = ms;
        self
    }

    pub fn with_simulated_stream_ms(mut self, ms: u64) -> Self {
        self.simulated_stream_ms = ms;
        self
    }

    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.set(key, value);
        self
    }

    pub fn with_definition(
        mut self,
        event: impl Into<String>,
        long: Option<&str>,
        short: Option<&str>,
    ) -> Self {
        self.definitions.insert(
            event.into(),
            DefinitionConfig {
                long: long.map(str::to_string),
                short: short.map(str::to_string),
            },
        );
        self
    }

    pub fn with_prototype(mut self, name: impl Into<String>, prototype: PrototypeConfig) -> Self {
        self.prototypes.insert(name.into(), prototype);
        self
    }

    pub fn with_controller(
        mut self,
        name: impl Into<String>,
        pattern: impl Into<String>,
        repeat: bool,
    ) -> Self {
        self.controllers.insert(
            name.into(),
            ControllerConfig {
                pattern: pattern.into(),
                repeat,
            },
        );
        self
    }

    pub fn with_vibra_pattern(
        mut self,
        name: impl Into<String>,
        duration_ms: u64,
        repeating: bool,
    ) -> Self {
        self.vibra_patterns.insert(
            name.into(),
            VibraPatternConfig {
                duration_ms,
                repeating,
            },
        );
        self
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;

        tracing::info!(
            "Loaded {} events and {} prototypes from {}",
            config.definitions.len(),
            config.prototypes.len(),
            path.display()
        );
        Ok(config)
    }

    /// `<config dir>/feedbackd/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("feedbackd").join("config.json"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vibra_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "vibra_poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.simulated_stream_ms == 0 {
            return Err(ConfigError::Invalid(
                "simulated_stream_ms must be greater than 0".to_string(),
            ));
        }

        for (event, definition) in &self.definitions {
            let names: Vec<&str> = [&definition.long, &definition.short]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .filter(|name| !name.is_empty())
                .collect();

            if names.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "event {} has neither a long nor a short prototype",
                    event
                )));
            }
            if let Some(missing) = names.iter().find(|name| !self.prototypes.contains_key(**name)) {
                return Err(ConfigError::Invalid(format!(
                    "event {} refers to unknown prototype {}",
                    event, missing
                )));
            }
        }

        for (name, controller) in &self.controllers {
            Controller::from_pattern(&controller.pattern, controller.repeat).map_err(|source| {
                ConfigError::Controller {
                    name: name.clone(),
                    source,
                }
            })?;
        }

        Ok(())
    }

    /// Build the event registry from the tables
    pub fn build_manager(&self) -> Result<EventManager, ConfigError> {
        let mut manager = EventManager::new();

        for (name, controller) in &self.controllers {
            let template = Controller::from_pattern(&controller.pattern, controller.repeat)
                .map_err(|source| ConfigError::Controller {
                    name: name.clone(),
                    source,
                })?;
            manager.register_controller(name.clone(), template);
        }

        for (name, prototype) in &self.prototypes {
            manager.register_prototype(
                name.clone(),
                EventPrototype::new(name.clone())
                    .with_properties(prototype.properties.clone())
                    .with_stream_properties(prototype.stream.clone())
                    .with_allowed_keys(prototype.allowed_keys.iter().cloned())
                    .with_disallow_override(prototype.disallow_override),
            );
        }

        for (event, definition) in &self.definitions {
            manager.register_definition(
                event.clone(),
                EventDefinition::new(definition.long.clone(), definition.short.clone()),
            );
        }

        Ok(manager)
    }

    /// Tunables handed to the orchestration core
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            vibra_poll_interval: Duration::from_millis(self.vibra_poll_interval_ms),
        }
    }

    pub fn simulated_stream_length(&self) -> Duration {
        Duration::from_millis(self.simulated_stream_ms)
    }
}
