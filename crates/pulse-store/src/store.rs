//! Record store contract consumed by the console.
//!
//! Stores answer predicate+sort fetches, count matches, and notify subscribers of
//! `(inserted, updated, removed)` diffs. Subscriptions are explicit handles that
//! unregister when cancelled or dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;

use pulse_core::{GroupKey, NewRecord, Predicate, Record, RecordBody, RecordId, SortDescriptor};

use crate::error::StoreError;

/// Default fetch batch hint.
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 100;

/// Query executed by a store.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// `None` matches every record.
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
    pub group: Option<GroupKey>,
    /// Performance hint only; results are always complete.
    pub batch_size: usize,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            predicate: None,
            sort: Vec::new(),
            group: None,
            batch_size: DEFAULT_FETCH_BATCH_SIZE,
        }
    }
}

/// Diff describing one store update cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreChange {
    pub inserted: Vec<RecordId>,
    pub updated: Vec<RecordId>,
    pub removed: Vec<RecordId>,
}

impl StoreChange {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.removed.len()
    }

    /// Fold a later diff into this one. An id inserted and then removed within the
    /// merged span disappears entirely; an inserted id that is later updated stays
    /// inserted.
    pub fn merge(&mut self, later: StoreChange) {
        for id in later.removed {
            let was_inserted = self.inserted.contains(&id);
            self.inserted.retain(|existing| *existing != id);
            self.updated.retain(|existing| *existing != id);
            if !was_inserted && !self.removed.contains(&id) {
                self.removed.push(id);
            }
        }
        for id in later.updated {
            if !self.inserted.contains(&id) && !self.updated.contains(&id) {
                self.updated.push(id);
            }
        }
        for id in later.inserted {
            if !self.inserted.contains(&id) {
                self.inserted.push(id);
            }
        }
    }
}

pub type StoreListener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

/// Read side of a record store.
pub trait RecordStore: Send + Sync {
    /// Every record matching `request.predicate`, ordered by `request.sort`.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Arc<Record>>, StoreError>;

    fn count_matching(&self, predicate: Option<&Predicate>) -> Result<usize, StoreError>;

    /// Register `listener` for change diffs until the returned handle is dropped.
    fn subscribe(&self, listener: StoreListener) -> Subscription;
}

/// Write side used by producers such as the network logger.
pub trait RecordSink: Send + Sync {
    fn append(&self, record: NewRecord) -> Result<RecordId, StoreError>;

    /// Replace the body of an existing record with a new snapshot of the same kind.
    fn replace(&self, id: RecordId, body: RecordBody) -> Result<(), StoreError>;
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    listeners: BTreeMap<u64, StoreListener>,
}

/// Listener bookkeeping shared by store implementations.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: StoreListener) -> Subscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id = inner.next_id.saturating_add(1);
        inner.listeners.insert(id, listener);
        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
            active: true,
        }
    }

    /// Deliver `change` to every listener. Listeners run outside the registry lock.
    pub fn notify(&self, change: &StoreChange) {
        if change.is_empty() {
            return;
        }
        let listeners: Vec<StoreListener> = lock(&self.inner).listeners.values().cloned().collect();
        for listener in listeners {
            listener(change);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for a registered listener.
#[must_use = "dropping a subscription unregisters its listener"]
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// A handle that was never registered.
    pub fn detached() -> Self {
        Self {
            registry: Weak::new(),
            id: 0,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active && self.registry.strong_count() > 0
    }

    pub fn cancel(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
