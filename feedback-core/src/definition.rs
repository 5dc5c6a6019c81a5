//! Event definitions and prototypes
//!
//! A definition maps an event name to the prototypes used for its long and
//! short play modes. A prototype is the immutable template of default
//! properties that an Event copies when it starts.

use std::fmt;

use feedback_store::Proplist;

/// Requested rendering length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayMode {
    Long,
    Short,
}

impl PlayMode {
    /// Parse the `play.mode` property value
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "long" => Some(PlayMode::Long),
            "short" => Some(PlayMode::Short),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayMode::Long => "long",
            PlayMode::Short => "short",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an event name to its long and short prototype names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDefinition {
    pub long_proto: Option<String>,
    pub short_proto: Option<String>,
}

impl EventDefinition {
    pub fn new(long_proto: Option<String>, short_proto: Option<String>) -> Self {
        Self {
            long_proto,
            short_proto,
        }
    }

    /// Name of the prototype for `mode`, if one is configured
    pub fn prototype_for(&self, mode: PlayMode) -> Option<&str> {
        match mode {
            PlayMode::Long => self.long_proto.as_deref(),
            PlayMode::Short => self.short_proto.as_deref(),
        }
        .filter(|name| !name.is_empty())
    }
}

/// Default rendering properties for one concrete event variant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPrototype {
    pub name: String,
    /// Defaults copied into every Event built from this prototype
    pub properties: Proplist,
    /// Metadata handed to the audio backend with each stream
    pub stream_properties: Proplist,
    /// Keys a client may override
    pub allowed_keys: Vec<String>,
    /// Ignore client overrides entirely
    pub disallow_override: bool,
}

impl EventPrototype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_properties(mut self, properties: Proplist) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_stream_properties(mut self, stream_properties: Proplist) -> Self {
        self.stream_properties = stream_properties;
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
