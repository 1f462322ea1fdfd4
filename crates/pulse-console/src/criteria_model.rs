//! Criteria state with per-field coalescing.
//!
//! Edits land in a draft immediately. The effective snapshot (what refreshes run
//! with) only changes when a field class is delivered by its coalescer, so a burst of
//! keystrokes produces one refresh carrying the final text.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use pulse_core::config::ConsoleConfig;
use pulse_core::{Criteria, Filters, GroupOptions, SortOptions};

use crate::coalescer::Coalescer;

#[derive(Debug)]
pub struct CriteriaModel {
    draft: Criteria,
    effective: Arc<Criteria>,
    filters: Coalescer<Filters>,
    only_errors: Coalescer<bool>,
    filter_term: Coalescer<String>,
}

impl CriteriaModel {
    pub fn new(config: &ConsoleConfig) -> Self {
        Self::with_intervals(config.criteria_debounce(), config.filter_term_throttle())
    }

    pub fn with_intervals(filters_debounce: Duration, term_throttle: Duration) -> Self {
        Self {
            draft: Criteria::default(),
            effective: Arc::new(Criteria::default()),
            filters: Coalescer::debounce(filters_debounce),
            only_errors: Coalescer::immediate(),
            filter_term: Coalescer::throttle(term_throttle),
        }
    }

    /// Latest edits, including those not yet delivered.
    pub fn draft(&self) -> &Criteria {
        &self.draft
    }

    /// Snapshot refreshes run with.
    pub fn current(&self) -> Arc<Criteria> {
        Arc::clone(&self.effective)
    }

    pub fn update(&mut self, filters: Filters, now: Instant) {
        self.draft.filters = filters.clone();
        self.filters.push(filters, now);
    }

    pub fn set_only_errors(&mut self, only_errors: bool, now: Instant) {
        self.draft.only_errors = only_errors;
        self.only_errors.push(only_errors, now);
    }

    pub fn set_filter_term(&mut self, term: &str, now: Instant) {
        self.draft.filter_term = term.to_owned();
        self.filter_term.push(term.to_owned(), now);
    }

    /// Sort changes rebuild the live query and apply without coalescing.
    pub fn set_sort(&mut self, sort: SortOptions) -> Arc<Criteria> {
        self.draft.sort = sort;
        self.replace_effective(|criteria| criteria.sort = sort)
    }

    pub fn set_group(&mut self, group: Option<GroupOptions>) -> Arc<Criteria> {
        self.draft.group = group;
        self.replace_effective(|criteria| criteria.group = group)
    }

    /// Deliver every field class whose deadline has passed. Returns the new
    /// snapshot when at least one class was delivered.
    pub fn poll(&mut self, now: Instant) -> Option<Arc<Criteria>> {
        let filters = self.filters.poll(now);
        let only_errors = self.only_errors.poll(now);
        let filter_term = self.filter_term.poll(now);
        if filters.is_none() && only_errors.is_none() && filter_term.is_none() {
            return None;
        }

        let mut next = (*self.effective).clone();
        if let Some(filters) = filters {
            next.filters = filters;
        }
        if let Some(only_errors) = only_errors {
            next.only_errors = only_errors;
        }
        if let Some(term) = filter_term {
            next.filter_term = term;
        }
        self.effective = Arc::new(next);
        Some(self.current())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.filters.next_deadline(),
            self.only_errors.next_deadline(),
            self.filter_term.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn has_pending(&self) -> bool {
        self.filters.is_pending() || self.only_errors.is_pending() || self.filter_term.is_pending()
    }

    fn replace_effective(&mut self, edit: impl FnOnce(&mut Criteria)) -> Arc<Criteria> {
        let mut next = (*self.effective).clone();
        edit(&mut next);
        self.effective = Arc::new(next);
        self.current()
    }
}
