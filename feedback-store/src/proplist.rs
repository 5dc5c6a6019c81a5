//! Property lists
//!
//! A `Proplist` maps string keys to [`Value`]s. Keys are unique and
//! iteration follows key order, so dumps and comparisons are stable.
//!
//! Typed getters keep the silent-default contract: asking for the wrong
//! type (or a missing key) yields `None`/`0`/`false` instead of an error.
//! Use [`Proplist::get`] when the difference matters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Ordered mapping from property key to [`Value`]
///
/// # Example
///
/// ```rust
/// use feedback_store::Proplist;
///
/// let mut defaults = Proplist::new();
/// defaults.set_string("audio", "ringtone.mp3");
/// defaults.set_int("audio.volume", 60);
///
/// let mut overrides = Proplist::new();
/// overrides.set_int("audio.volume", 90);
/// overrides.set_string("audio", "/tmp/evil.mp3");
///
/// // Only listed keys make it through
/// defaults.merge_allowed(&overrides, &["audio.volume"]);
/// assert_eq!(defaults.get_int("audio.volume"), 90);
/// assert_eq!(defaults.get_string("audio"), Some("ringtone.mp3"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proplist {
    values: BTreeMap<String, Value>,
}

impl Proplist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing (and dropping) any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), Value::String(value.into()));
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i32) {
        self.values.insert(key.into(), Value::Int(value));
    }

    pub fn set_uint(&mut self, key: impl Into<String>, value: u32) {
        self.values.insert(key.into(), Value::UInt(value));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.values.insert(key.into(), Value::Bool(value));
    }

    pub fn set_pointer(&mut self, key: impl Into<String>, address: usize) {
        self.values.insert(key.into(), Value::Pointer(address));
    }

    /// Get the raw value for a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a string value; `None` if missing or not a string
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Get a non-empty string value
    ///
    /// Empty strings are treated like missing keys, which is what every
    /// filename and pattern lookup wants.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get_string(key).filter(|s| !s.is_empty())
    }

    /// Get an int value; `0` if missing or not an int
    pub fn get_int(&self, key: &str) -> i32 {
        self.values.get(key).and_then(Value::as_int).unwrap_or(0)
    }

    /// Get a uint value; `0` if missing or not a uint
    pub fn get_uint(&self, key: &str) -> u32 {
        self.values.get(key).and_then(Value::as_uint).unwrap_or(0)
    }

    /// Get a bool value; `false` if missing or not a bool
    pub fn get_bool(&self, key: &str) -> bool {
        self.get_bool_or(key, false)
    }

    /// Get a bool value with an explicit default for missing/mismatched keys
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Get a pointer value; `0` (null) if missing or not a pointer
    pub fn get_pointer(&self, key: &str) -> usize {
        self.values.get(key).and_then(Value::as_pointer).unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every entry of `source` into `self`, replacing overlapping keys
    pub fn merge(&mut self, source: &Proplist) {
        for (key, value) in &source.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Copy only the entries of `source` whose key is in `allowed`
    ///
    /// This is the boundary between client-supplied overrides and
    /// prototype defaults: keys not on the list are never copied, and keys
    /// on the list but absent from `source` leave `self` untouched.
    pub fn merge_allowed<S: AsRef<str>>(&mut self, source: &Proplist, allowed: &[S]) {
        for key in allowed {
            let key = key.as_ref();
            if let Some(value) = source.values.get(key) {
                self.values.insert(key.to_string(), value.clone());
            }
        }
    }

    /// Keep only the entries whose key starts with `prefix`, with the
    /// prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Proplist {
        let values = self
            .values
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();
        Proplist { values }
    }

    /// Log every entry at debug level
    pub fn dump(&self, label: &str) {
        tracing::debug!("{} ({} properties)", label, self.values.len());
        for (key, value) in &self.values {
            tracing::debug!("  {} = {}", key, value);
        }
    }
}

impl fmt::Display for Proplist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.values {
            writeln!(f, "{} = {}", key, value)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Proplist {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let values = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Proplist { values }
    }
}

impl<'a> IntoIterator for &'a Proplist {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
