//! Feedback Property Store
//!
//! Typed values, property lists and the observable context blackboard that
//! the feedback daemon is built on.
//!
//! # Features
//!
//! - **Tagged Values**: `Value` carries its own type, so a value can never
//!   disagree with its tag
//! - **Property Lists**: ordered key/value maps with silent-default getters
//!   and allow-list merging
//! - **Context**: a shared blackboard that broadcasts every change to
//!   key-filtered subscribers
//!
//! # Quick Start
//!
//! ```rust
//! use feedback_store::{Context, Proplist, Value};
//!
//! let context = Context::new();
//! context.set_value("profile.silent", Value::Bool(false));
//!
//! let mut props = Proplist::new();
//! props.set_string("audio", "ringtone.mp3");
//! props.set_bool("audio.repeat", true);
//!
//! assert_eq!(props.get_string("audio"), Some("ringtone.mp3"));
//! assert_eq!(context.get_bool("profile.silent"), Some(false));
//! ```
//!
//! # Architecture
//!
//! ```text
//! Context
//!     │
//!     ├── values: HashMap<String, Value>
//!     │
//!     └── subscribers: Vec<(SubscriptionId, Option<key>, callback)>
//!
//! Proplist
//!     │
//!     └── values: BTreeMap<String, Value>
//! ```

// Modules
pub mod context;
pub mod proplist;
pub mod value;

// Re-exports - Public API
pub use context::{ChangeCallback, Context, SubscriptionId};
pub use proplist::Proplist;
pub use value::{Value, ValueType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::context::{Context, SubscriptionId};
    pub use crate::proplist::Proplist;
    pub use crate::value::{Value, ValueType};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_full_workflow() {
        let context = Arc::new(Context::new());
        context.set_value("profile.ringing.alert.tone", Value::from("ring.mp3"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        context.subscribe(Some("profile.ringing.alert.tone"), move |_, old, new| {
            sink.lock().unwrap().push((old.cloned(), new.clone()));
        });

        // A profile change lands in the context and is broadcast
        context.set_value("profile.ringing.alert.tone", Value::from("bell.mp3"));

        let changes = seen.lock().unwrap().clone();
        assert_eq!(
            changes,
            vec![(Some(Value::from("ring.mp3")), Value::from("bell.mp3"))]
        );

        // Client overrides are filtered through the allow-list
        let mut props = Proplist::new();
        props.set_string("audio", "default.mp3");
        let mut overrides = Proplist::new();
        overrides.set_string("audio", "custom.mp3");
        overrides.set_int("audio.volume", 10);

        props.merge_allowed(&overrides, &["audio.volume"]);
        assert_eq!(props.get_string("audio"), Some("default.mp3"));
        assert_eq!(props.get_int("audio.volume"), 10);
    }

    #[test]
    fn test_shared_context_across_threads() {
        let context = Arc::new(Context::new());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let context = Arc::clone(&context);
                std::thread::spawn(move || {
                    context.set_value(format!("key-{}", i), Value::Int(i));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(context.len(), 4);
        assert_eq!(context.get_int("key-2"), Some(2));
    }
}
