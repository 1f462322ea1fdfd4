//! In-memory append-only record store.
//!
//! Records are kept in id order. Every mutation notifies listeners once, after the
//! write lock is released.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pulse_core::config::StoreConfig;
use pulse_core::predicate::matches_optional;
use pulse_core::sort::sort_records;
use pulse_core::{NewRecord, Predicate, Record, RecordBody, RecordId};

use crate::error::StoreError;
use crate::store::{
    FetchRequest, ListenerRegistry, RecordSink, RecordStore, StoreChange, StoreListener,
    Subscription,
};

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<Arc<Record>>,
    next_id: u64,
}

impl StoreState {
    fn position(&self, id: RecordId) -> Option<usize> {
        self.records.binary_search_by_key(&id, |record| record.id).ok()
    }
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    state: RwLock<StoreState>,
    listeners: ListenerRegistry,
    max_records: usize,
    pending_failures: AtomicUsize,
    fetches: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            max_records: config.max_records,
            ..Self::default()
        }
    }

    /// Append several records as one update cycle.
    pub fn append_batch(&self, records: Vec<NewRecord>) -> Result<Vec<RecordId>, StoreError> {
        for record in &records {
            validate(&record.body)?;
        }
        let mut change = StoreChange::default();
        {
            let mut state = self.write();
            for new in records {
                state.next_id = state.next_id.saturating_add(1);
                let id = RecordId(state.next_id);
                state.records.push(Arc::new(Record::from_new(id, new)));
                change.inserted.push(id);
            }
            change.removed = self.sweep(&mut state);
        }
        // Records swept in the same cycle are reported as removed, not inserted.
        change.inserted.retain(|id| !change.removed.contains(id));
        let ids = change.inserted.clone();
        self.listeners.notify(&change);
        Ok(ids)
    }

    /// Remove every record. Listeners see one removal diff.
    pub fn clear(&self) -> usize {
        let removed: Vec<RecordId> = {
            let mut state = self.write();
            state.records.drain(..).map(|record| record.id).collect()
        };
        let count = removed.len();
        self.listeners.notify(&StoreChange {
            removed,
            ..StoreChange::default()
        });
        count
    }

    pub fn get(&self, id: RecordId) -> Option<Arc<Record>> {
        let state = self.read();
        state.position(id).map(|idx| Arc::clone(&state.records[idx]))
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Make the next `count` fetches fail with `StoreError::Fetch`.
    pub fn fail_next_fetches(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of fetches served (including failed ones).
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn sweep(&self, state: &mut StoreState) -> Vec<RecordId> {
        if self.max_records == 0 || state.records.len() <= self.max_records {
            return Vec::new();
        }
        let excess = state.records.len() - self.max_records;
        let removed: Vec<RecordId> = state
            .records
            .drain(..excess)
            .map(|record| record.id)
            .collect();
        tracing::debug!(removed = removed.len(), cap = self.max_records, "retention sweep");
        removed
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Arc<Record>>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(StoreError::Fetch("injected failure".into()));
        }
        let mut records: Vec<Arc<Record>> = self
            .read()
            .records
            .iter()
            .filter(|record| matches_optional(request.predicate.as_ref(), record))
            .cloned()
            .collect();
        sort_records(&mut records, &request.sort);
        tracing::trace!(
            matched = records.len(),
            batch_size = request.batch_size,
            "fetch"
        );
        Ok(records)
    }

    fn count_matching(&self, predicate: Option<&Predicate>) -> Result<usize, StoreError> {
        Ok(self
            .read()
            .records
            .iter()
            .filter(|record| matches_optional(predicate, record))
            .count())
    }

    fn subscribe(&self, listener: StoreListener) -> Subscription {
        self.listeners.register(listener)
    }
}

impl RecordSink for InMemoryRecordStore {
    fn append(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        // The newest record is never swept, so a single append always yields its id.
        self.append_batch(vec![record])?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable("append produced no record".into()))
    }

    fn replace(&self, id: RecordId, body: RecordBody) -> Result<(), StoreError> {
        validate(&body)?;
        {
            let mut state = self.write();
            let idx = state.position(id).ok_or(StoreError::NotFound(id))?;
            let current = &state.records[idx];
            if std::mem::discriminant(&current.body) != std::mem::discriminant(&body) {
                return Err(StoreError::InvalidRecord(format!(
                    "record {id} cannot change kind"
                )));
            }
            let replacement = Record {
                id,
                created_at: current.created_at,
                session: current.session,
                body,
            };
            state.records[idx] = Arc::new(replacement);
        }
        self.listeners.notify(&StoreChange {
            updated: vec![id],
            ..StoreChange::default()
        });
        Ok(())
    }
}

fn validate(body: &RecordBody) -> Result<(), StoreError> {
    match body {
        RecordBody::Log(entry) if entry.label.trim().is_empty() => {
            Err(StoreError::InvalidRecord("log label is required".into()))
        }
        RecordBody::Task(task) if task.url.trim().is_empty() => {
            Err(StoreError::InvalidRecord("task url is required".into()))
        }
        _ => Ok(()),
    }
}
