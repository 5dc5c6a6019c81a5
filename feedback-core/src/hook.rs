//! Priority-ordered hooks and the core extension points
//!
//! A [`Hook<T>`] is a list of callback slots sorted by descending priority.
//! Firing a hook runs every slot in order on the same mutable payload;
//! there is no short-circuiting. Plugins attach to the named points in
//! [`CoreHooks`] to observe or rewrite requests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use feedback_store::Proplist;
use parking_lot::RwLock;

use crate::request::{Request, RequestId};

/// Identifier returned by [`Hook::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

type SlotCallback<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

struct Slot<T> {
    id: SlotId,
    priority: i32,
    callback: SlotCallback<T>,
}

// Manual impl: `T` itself does not need to be Clone
impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// A priority-ordered list of callbacks over a payload of type `T`
pub struct Hook<T> {
    name: &'static str,
    slots: RwLock<Vec<Slot<T>>>,
    next_id: AtomicU64,
}

impl<T> Hook<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Connect a callback
    ///
    /// Higher priorities run first. Slots with equal priority run in the
    /// order they were connected.
    pub fn connect<F>(&self, priority: i32, callback: F) -> SlotId
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let id = SlotId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut slots = self.slots.write();

        // Insert before the first slot of strictly lower priority
        let pos = slots
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(slots.len());
        slots.insert(
            pos,
            Slot {
                id,
                priority,
                callback: Arc::new(callback),
            },
        );

        tracing::debug!("Connected {} to hook {} (priority {})", id, self.name, priority);
        id
    }

    /// Disconnect a slot; returns whether it was connected
    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|s| s.id != id);
        slots.len() < before
    }

    /// Run every connected slot, in priority order, on `payload`
    ///
    /// Slots run on a snapshot, so a callback may connect or disconnect
    /// slots without affecting the current firing.
    pub fn fire(&self, payload: &mut T) {
        let slots: Vec<Slot<T>> = self.slots.read().clone();
        tracing::trace!("Firing hook {} ({} slots)", self.name, slots.len());

        for slot in slots {
            (slot.callback)(payload);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("slots", &self.len())
            .finish()
    }
}

/// Named extension points of the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreHook {
    /// All backends and sinks are initialized
    InitDone,
    /// An inbound request arrived, before resolution
    NewRequest,
    /// Properties were merged, before resource setup
    TransformProperties,
    /// Sinks were probed with `can_handle`, before `prepare`
    FilterSinks,
}

impl CoreHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreHook::InitDone => "init_done",
            CoreHook::NewRequest => "new_request",
            CoreHook::TransformProperties => "transform_properties",
            CoreHook::FilterSinks => "filter_sinks",
        }
    }
}

impl fmt::Display for CoreHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the filter-sinks hook
///
/// `sinks` holds the names of the sinks that can handle the request; a
/// plugin vetoes a sink by removing its name.
#[derive(Debug, Clone)]
pub struct FilterSinks {
    pub request_id: RequestId,
    pub event_name: String,
    pub properties: Proplist,
    pub sinks: Vec<String>,
}

impl FilterSinks {
    /// Remove a sink from the candidate list
    pub fn remove(&mut self, sink: &str) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|s| s != sink);
        self.sinks.len() < before
    }
}

/// The hook points every plugin can attach to
#[derive(Debug)]
pub struct CoreHooks {
    pub init_done: Hook<()>,
    pub new_request: Hook<Request>,
    pub transform_properties: Hook<Request>,
    pub filter_sinks: Hook<FilterSinks>,
}

impl CoreHooks {
    pub fn new() -> Self {
        Self {
            init_done: Hook::new(CoreHook::InitDone.as_str()),
            new_request: Hook::new(CoreHook::NewRequest.as_str()),
            transform_properties: Hook::new(CoreHook::TransformProperties.as_str()),
            filter_sinks: Hook::new(CoreHook::FilterSinks.as_str()),
        }
    }
}

impl Default for CoreHooks {
    fn default() -> Self {
        Self::new()
    }
}
