//! Per-instance property store.
//!
//! The intercepted manager type cannot carry extra fields, so override
//! state lives in a process-wide side table keyed by instance identity.
//! The table holds two enable flags and a weak listener per instance. It is
//! association only: nothing in here keeps a manager or a listener alive,
//! and an instance's entry is removed when the instance is destroyed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use ahash::RandomState;

use crate::provider::LocationListener;

/// Stable identity of one intercepted manager instance.
///
/// Allocated from a process-wide counter at construction; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Override flags and listener for one intercepted instance.
#[derive(Debug, Clone)]
pub struct InstanceProperty {
    pub location_updates_enabled: bool,
    pub heading_updates_enabled: bool,
    /// Weak by contract: the instance's owner holds the listener.
    pub listener: Option<Weak<dyn LocationListener>>,
}

impl Default for InstanceProperty {
    fn default() -> Self {
        Self {
            location_updates_enabled: true,
            heading_updates_enabled: true,
            listener: None,
        }
    }
}

/// Process-wide table of [`InstanceProperty`] records.
///
/// Safe under concurrent access from connection-handling threads and the
/// application's own contexts. Records are created lazily on first access
/// and removed explicitly via [`PropertyStore::remove`].
#[derive(Default)]
pub struct PropertyStore {
    entries: Mutex<HashMap<InstanceId, InstanceProperty, RandomState>>,
}

impl PropertyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh instance and hand back its identity.
    pub fn register(&self) -> InstanceId {
        let id = InstanceId::next();
        self.entries
            .lock()
            .unwrap()
            .insert(id, InstanceProperty::default());
        id
    }

    /// Snapshot of the record for `id`, creating a default record on first
    /// access.
    pub fn properties_for(&self, id: InstanceId) -> InstanceProperty {
        self.entries.lock().unwrap().entry(id).or_default().clone()
    }

    /// Mutate the record for `id` in place, creating it on first access.
    pub fn update(&self, id: InstanceId, apply: impl FnOnce(&mut InstanceProperty)) {
        let mut entries = self.entries.lock().unwrap();
        apply(entries.entry(id).or_default());
    }

    pub fn set_listener(&self, id: InstanceId, listener: Weak<dyn LocationListener>) {
        self.update(id, |property| property.listener = Some(listener));
    }

    pub fn set_location_updates_enabled(&self, id: InstanceId, enabled: bool) {
        self.update(id, |property| property.location_updates_enabled = enabled);
    }

    pub fn set_heading_updates_enabled(&self, id: InstanceId, enabled: bool) {
        self.update(id, |property| property.heading_updates_enabled = enabled);
    }

    /// Drop the record for `id`. Called when the owning instance is
    /// destroyed; entries must not accumulate across create/destroy cycles.
    pub fn remove(&self, id: InstanceId) {
        self.entries.lock().unwrap().remove(&id);
    }

    /// Live listeners whose instances have location updates enabled.
    ///
    /// Upgrades the weak references at call time, so the returned set is a
    /// consistent snapshot for one fan-out.
    pub fn location_recipients(&self) -> Vec<Arc<dyn LocationListener>> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|property| property.location_updates_enabled)
            .filter_map(|property| property.listener.as_ref()?.upgrade())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
