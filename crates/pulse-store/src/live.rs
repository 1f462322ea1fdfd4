//! Live query handle: a fetch request bound to a store subscription.

use std::sync::Arc;

use pulse_core::section::{self, Section};
use pulse_core::{Predicate, Record};

use crate::error::StoreError;
use crate::store::{FetchRequest, RecordStore, StoreChange, Subscription};

/// Store diff tagged with the generation of the live query that observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveChange {
    pub generation: u64,
    pub change: StoreChange,
}

pub type LiveListener = Arc<dyn Fn(LiveChange) + Send + Sync>;

pub struct LiveResultHandle {
    store: Arc<dyn RecordStore>,
    request: FetchRequest,
    generation: u64,
    results: Vec<Arc<Record>>,
    sections: Option<Vec<Section>>,
    // Held for its drop; unsubscribes with the handle.
    _subscription: Subscription,
}

impl LiveResultHandle {
    /// Bind `request` to `store`. Diffs reach `listener` tagged with `generation`.
    /// No fetch is performed until `perform_fetch` or `install`.
    pub fn open(
        store: Arc<dyn RecordStore>,
        request: FetchRequest,
        generation: u64,
        listener: LiveListener,
    ) -> Self {
        let subscription = store.subscribe(Arc::new(move |change: &StoreChange| {
            listener(LiveChange {
                generation,
                change: change.clone(),
            });
        }));
        Self {
            store,
            request,
            generation,
            results: Vec::new(),
            sections: None,
            _subscription: subscription,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn set_predicate(&mut self, predicate: Option<Predicate>) {
        self.request.predicate = predicate;
    }

    /// Fetch synchronously and replace the current results.
    pub fn perform_fetch(&mut self) -> Result<usize, StoreError> {
        let records = self.store.fetch(&self.request)?;
        let len = records.len();
        self.install(records);
        Ok(len)
    }

    /// Replace the current results with `records`, already fetched for this request.
    pub fn install(&mut self, records: Vec<Arc<Record>>) {
        self.sections = self
            .request
            .group
            .map(|key| section::partition(&records, key));
        self.results = records;
    }

    pub fn current_results(&self) -> &[Arc<Record>] {
        &self.results
    }

    /// Section boundaries; `None` unless the request groups.
    pub fn current_sections(&self) -> Option<&[Section]> {
        self.sections.as_deref()
    }
}

impl std::fmt::Debug for LiveResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveResultHandle")
            .field("generation", &self.generation)
            .field("results", &self.results.len())
            .field("grouped", &self.request.group.is_some())
            .finish()
    }
}
