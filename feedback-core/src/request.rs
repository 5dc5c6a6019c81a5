//! Requests and resource grants
//!
//! A [`Request`] is the live, mutable view of one play request: its event
//! name, the merged property list, and opaque per-sink data. Hooks and
//! sinks receive `&mut Request` and mutate it in place.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use feedback_store::Proplist;

use crate::keys;

/// Identifier of an accepted play request
///
/// On the wire an id of `0` means "rejected", so valid ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

impl RequestId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

impl From<u32> for RequestId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Output modalities a request is permitted to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
    pub audio: bool,
    pub vibra: bool,
    pub leds: bool,
    pub backlight: bool,
}

impl Resources {
    /// All modalities granted
    pub fn all() -> Self {
        Self {
            audio: true,
            vibra: true,
            leds: true,
            backlight: true,
        }
    }

    /// Read the `media.*` flags of a request
    pub fn from_properties(properties: &Proplist) -> Self {
        Self {
            audio: properties.get_bool(keys::MEDIA_AUDIO),
            vibra: properties.get_bool(keys::MEDIA_VIBRA),
            leds: properties.get_bool(keys::MEDIA_LEDS),
            backlight: properties.get_bool(keys::MEDIA_BACKLIGHT),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.audio || self.vibra || self.leds || self.backlight)
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.audio, "audio"),
            (self.vibra, "vibra"),
            (self.leds, "leds"),
            (self.backlight, "backlight"),
        ]
        .into_iter()
        .filter_map(|(granted, name)| granted.then_some(name))
        .collect();

        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// The live state of one play request
pub struct Request {
    pub id: RequestId,
    pub name: String,
    pub properties: Proplist,
    data: HashMap<String, Box<dyn Any + Send>>,
}

impl Request {
    pub fn new(id: RequestId, name: impl Into<String>, properties: Proplist) -> Self {
        Self {
            id,
            name: name.into(),
            properties,
            data: HashMap::new(),
        }
    }

    /// Attach opaque data under `key` (usually the sink name)
    pub fn store_data<T: Any + Send>(&mut self, key: impl Into<String>, data: T) {
        self.data.insert(key.into(), Box::new(data));
    }

    pub fn data<T: Any + Send>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|d| d.downcast_ref::<T>())
    }

    pub fn data_mut<T: Any + Send>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key).and_then(|d| d.downcast_mut::<T>())
    }

    /// Remove and return the data under `key` if it has type `T`
    ///
    /// Data of another type is left in place.
    pub fn take_data<T: Any + Send>(&mut self, key: &str) -> Option<T> {
        if !self.data.get(key).is_some_and(|d| d.is::<T>()) {
            return None;
        }
        self.data
            .remove(key)
            .and_then(|d| d.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}
