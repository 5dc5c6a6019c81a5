//! Observable context blackboard
//!
//! The `Context` holds process-wide state shared by the core, backends and
//! plugins (current profile values, call state, ...). Every `set_value`
//! is broadcast synchronously to the subscribers whose key filter matches.
//!
//! Broadcasts iterate over a snapshot of the subscriber list and no lock is
//! held while a callback runs, so a subscriber may set further values or
//! subscribe/unsubscribe from inside its callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::Value;

/// Identifier returned by [`Context::subscribe`]
///
/// The id stands for one (key filter, callback) registration; pass it back
/// to [`Context::unsubscribe`] to remove exactly that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Change callback: `(key, old_value, new_value)`
pub type ChangeCallback = Arc<dyn Fn(&str, Option<&Value>, &Value) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    key: Option<String>,
    callback: ChangeCallback,
}

impl Subscriber {
    fn matches(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |filter| filter == key)
    }
}

/// Keyed value store with change notification
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use feedback_store::{Context, Value};
///
/// let context = Context::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// context.subscribe(Some("call.state"), move |key, _old, new| {
///     sink.lock().unwrap().push((key.to_string(), new.clone()));
/// });
///
/// context.set_value("profile.silent", Value::Bool(true));
/// context.set_value("call.state", Value::from("active"));
///
/// assert_eq!(seen.lock().unwrap().len(), 1);
/// ```
pub struct Context {
    values: RwLock<HashMap<String, Value>>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Context {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Store a value and broadcast the change
    ///
    /// Subscribers are called even when the new value equals the old one.
    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let old = self.values.write().insert(key.clone(), value.clone());

        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.matches(&key))
            .cloned()
            .collect();

        tracing::trace!(
            "Context {} changed, notifying {} subscribers",
            key,
            subscribers.len()
        );

        for subscriber in subscribers {
            (subscriber.callback)(&key, old.as_ref(), &value);
        }
    }

    /// Get a copy of the value stored under `key`
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.values.read().get(key).and_then(Value::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).and_then(Value::as_bool)
    }

    /// Remove a value without notifying subscribers
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Subscribe to changes of `key`, or of every key when `key` is `None`
    pub fn subscribe<F>(&self, key: Option<&str>, callback: F) -> SubscriptionId
    where
        F: Fn(&str, Option<&Value>, &Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber {
            id,
            key: key.map(str::to_string),
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove a subscription, returning whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() < before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("value_count", &self.len())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(String, Option<Value>, Value)>>>;

    fn recorder(seen: &Seen) -> impl Fn(&str, Option<&Value>, &Value) + Send + Sync + 'static {
        let seen = Arc::clone(seen);
        move |key, old, new| {
            seen.lock()
                .unwrap()
                .push((key.to_string(), old.cloned(), new.clone()));
        }
    }

    #[test]
    fn test_set_and_get() {
        let context = Context::new();
        assert!(context.is_empty());

        context.set_value("profile.silent", Value::Bool(true));
        context.set_value("profile.ringing.alert.tone", Value::from("ring.mp3"));

        assert_eq!(context.len(), 2);
        assert_eq!(context.get_bool("profile.silent"), Some(true));
        assert_eq!(
            context.get_string("profile.ringing.alert.tone").as_deref(),
            Some("ring.mp3")
        );
        assert_eq!(context.get_int("profile.silent"), None);
    }

    #[test]
    fn test_filtered_subscriber_ignores_other_keys() {
        let context = Context::new();
        let seen: Seen = Arc::default();
        context.subscribe(Some("X"), recorder(&seen));

        context.set_value("Y", Value::Int(1));
        assert!(seen.lock().unwrap().is_empty());

        context.set_value("X", Value::Int(2));
        let events = seen.lock().unwrap().clone();
        assert_eq!(events, vec![("X".to_string(), None, Value::Int(2))]);
    }

    #[test]
    fn test_old_value_is_reported() {
        let context = Context::new();
        context.set_value("X", Value::Int(1));

        let seen: Seen = Arc::default();
        context.subscribe(Some("X"), recorder(&seen));
        context.set_value("X", Value::Int(5));

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![("X".to_string(), Some(Value::Int(1)), Value::Int(5))]
        );
    }

    #[test]
    fn test_wildcard_subscriber_sees_every_key() {
        let context = Context::new();
        let seen: Seen = Arc::default();
        context.subscribe(None, recorder(&seen));

        context.set_value("a", Value::Int(1));
        context.set_value("b", Value::Int(2));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let context = Context::new();
        let seen: Seen = Arc::default();
        let id = context.subscribe(Some("X"), recorder(&seen));

        assert!(context.unsubscribe(id));
        assert!(!context.unsubscribe(id));

        context.set_value("X", Value::Int(1));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(context.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_may_reenter() {
        let context = Arc::new(Context::new());
        let seen: Seen = Arc::default();

        // Mirror "call.state" into "call.active" from inside the broadcast
        let inner = Arc::clone(&context);
        context.subscribe(Some("call.state"), move |_, _, new| {
            let active = new.as_str() == Some("active");
            inner.set_value("call.active", Value::Bool(active));
        });
        context.subscribe(Some("call.active"), recorder(&seen));

        context.set_value("call.state", Value::from("active"));

        assert_eq!(context.get_bool("call.active"), Some(true));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself() {
        let context = Arc::new(Context::new());
        let calls = Arc::new(Mutex::new(0));
        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::default();

        let inner = Arc::clone(&context);
        let slot = Arc::clone(&id_slot);
        let counter = Arc::clone(&calls);
        let id = context.subscribe(None, move |_, _, _| {
            *counter.lock().unwrap() += 1;
            if let Some(id) = *slot.lock().unwrap() {
                inner.unsubscribe(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        context.set_value("a", Value::Int(1));
        context.set_value("a", Value::Int(2));

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
