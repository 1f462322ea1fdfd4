//! Console list view model.
//!
//! Owns the criteria model, query engine and window manager, and is driven from a
//! single context: user calls, `tick` for coalesced criteria, and store diffs queued
//! by the live query listener. Every applied refresh is published as a
//! `RefreshEvent`.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use pulse_core::config::ConsoleConfig;
use pulse_core::section::{self, Section};
use pulse_core::{Criteria, Filters, GroupOptions, Mode, Record, RecordId, SortOptions};
use pulse_store::{LiveChange, LiveListener, RecordStore, StoreChange};

use crate::criteria_model::CriteriaModel;
use crate::query_engine::{ChangeAction, QueryEngine, RefreshOutcome, ResultSet};
use crate::window::{ScrollPosition, ViewWindowManager};

/// What triggered a refresh event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshKind {
    Initial,
    Criteria,
    Mode,
    /// Sort or grouping change; the live query was rebuilt.
    Structure,
    StoreChange,
    Visibility,
    Manual,
    /// Scroll transition resized the window; results are unchanged.
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Fresh,
    /// The fetch failed and the previous results are still shown.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshEvent {
    pub generation: u64,
    pub kind: RefreshKind,
    pub status: RefreshStatus,
    pub animated: bool,
    pub window_recomputed: bool,
    pub result_count: usize,
    pub visible_count: usize,
    pub log_count: usize,
    pub task_count: usize,
    /// Store diffs folded into a `StoreChange` refresh, for row animation.
    pub changes: Option<StoreChange>,
}

/// Point-in-time view of everything the renderer reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleSnapshot {
    pub mode: Mode,
    pub criteria: Criteria,
    pub visible_ids: Vec<RecordId>,
    pub sections: Option<Vec<Section>>,
    pub result_count: usize,
    pub log_count: usize,
    pub task_count: usize,
    pub limit: usize,
    pub scroll_position: ScrollPosition,
    pub displayed: bool,
    pub generation: u64,
}

pub struct ConsoleListViewModel {
    mode: Mode,
    criteria: CriteriaModel,
    engine: QueryEngine,
    window: ViewWindowManager,
    results: ResultSet,
    sections: Option<Vec<Section>>,
    displayed: bool,
    changes: mpsc::UnboundedReceiver<LiveChange>,
    events: broadcast::Sender<RefreshEvent>,
}

impl ConsoleListViewModel {
    /// Build the live query for `Mode::All` and load the first result set. The view
    /// starts hidden; `set_visible(true)` marks it displayed.
    pub fn new(store: Arc<dyn RecordStore>, config: &ConsoleConfig) -> Self {
        let (changes_tx, changes) = mpsc::unbounded_channel();
        let listener: LiveListener = Arc::new(move |change: LiveChange| {
            // The receiver only closes when the view model is gone.
            let _ = changes_tx.send(change);
        });
        let (events, _) = broadcast::channel(config.refresh_event_capacity.max(1));
        let mut model = Self {
            mode: Mode::All,
            criteria: CriteriaModel::new(config),
            engine: QueryEngine::new(store, config.fetch_batch_size, listener),
            window: ViewWindowManager::from_config(config),
            results: ResultSet::default(),
            sections: None,
            displayed: false,
            changes,
            events,
        };
        model.rebuild(RefreshKind::Initial);
        model
    }

    pub fn visible_entities(&self) -> &[Arc<Record>] {
        self.window.visible()
    }

    /// Section boundaries clipped to the visible window; `None` unless grouping.
    pub fn sections(&self) -> Option<&[Section]> {
        self.sections.as_deref()
    }

    pub fn result_set(&self) -> &ResultSet {
        &self.results
    }

    pub fn log_count(&self) -> usize {
        self.engine.log_count()
    }

    pub fn task_count(&self) -> usize {
        self.engine.task_count()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn criteria(&self) -> Arc<Criteria> {
        self.criteria.current()
    }

    pub fn scroll_position(&self) -> ScrollPosition {
        self.window.scroll_position()
    }

    pub fn limit(&self) -> usize {
        self.window.limit()
    }

    pub fn is_visible(&self) -> bool {
        self.displayed
    }

    pub fn generation(&self) -> u64 {
        self.engine.applied_generation()
    }

    /// The `did_refresh` stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Sender behind `subscribe`, for owners that hand out receivers later.
    pub fn event_sender(&self) -> broadcast::Sender<RefreshEvent> {
        self.events.clone()
    }

    pub fn snapshot(&self) -> ConsoleSnapshot {
        ConsoleSnapshot {
            mode: self.mode,
            criteria: (*self.criteria.current()).clone(),
            visible_ids: self.window.visible_ids(),
            sections: self.sections.clone(),
            result_count: self.results.len(),
            log_count: self.log_count(),
            task_count: self.task_count(),
            limit: self.window.limit(),
            scroll_position: self.window.scroll_position(),
            displayed: self.displayed,
            generation: self.generation(),
        }
    }

    pub fn set_mode(&mut self, mode: Mode) -> Option<RefreshEvent> {
        self.mode = mode;
        self.rebuild(RefreshKind::Mode)
    }

    /// Becoming visible forces a mandatory reload.
    pub fn set_visible(&mut self, visible: bool) -> Option<RefreshEvent> {
        let was_visible = self.displayed;
        self.displayed = visible;
        if visible && !was_visible {
            return self.refresh_with(RefreshKind::Visibility, true, false, None);
        }
        None
    }

    pub fn set_sort(&mut self, sort: SortOptions) -> Option<RefreshEvent> {
        self.criteria.set_sort(sort);
        self.rebuild(RefreshKind::Structure)
    }

    pub fn set_group(&mut self, group: Option<GroupOptions>) -> Option<RefreshEvent> {
        self.criteria.set_group(group);
        self.rebuild(RefreshKind::Structure)
    }

    pub fn update_filters(&mut self, filters: Filters, now: Instant) {
        self.criteria.update(filters, now);
    }

    pub fn set_only_errors(&mut self, only_errors: bool, now: Instant) {
        self.criteria.set_only_errors(only_errors, now);
    }

    pub fn set_filter_term(&mut self, term: &str, now: Instant) {
        self.criteria.set_filter_term(term, now);
    }

    /// Deliver due criteria edits. A delivered edit swaps the predicate only.
    pub fn tick(&mut self, now: Instant) -> Option<RefreshEvent> {
        let criteria = self.criteria.poll(now)?;
        tracing::debug!(criteria = %criteria.active_label(), "criteria changed");
        self.refresh_with(RefreshKind::Criteria, true, false, None)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.criteria.next_deadline()
    }

    /// Re-run the current query.
    pub fn refresh(&mut self) -> Option<RefreshEvent> {
        self.refresh_with(RefreshKind::Manual, false, false, None)
    }

    pub fn on_appear(&mut self, id: RecordId) -> Option<RefreshEvent> {
        let transition = self.window.on_item_appear(id, &self.results.records)?;
        tracing::trace!(?transition, "scroll transition");
        self.window_changed()
    }

    pub fn on_disappear(&mut self, id: RecordId) -> Option<RefreshEvent> {
        let transition = self.window.on_item_disappear(id, &self.results.records)?;
        tracing::trace!(?transition, "scroll transition");
        self.window_changed()
    }

    /// Wait for the next store diff observed by the live query.
    pub async fn next_change(&mut self) -> Option<LiveChange> {
        self.changes.recv().await
    }

    /// Apply `change` plus any diffs already queued behind it with one refresh.
    /// Diffs from a superseded live query are dropped; the rest are merged in order.
    pub fn handle_store_change(&mut self, change: LiveChange) -> Option<RefreshEvent> {
        let first_generation = change.generation;
        let mut action = ChangeAction::Ignore;
        let mut merged = StoreChange::default();
        let mut diffs = 0usize;
        let mut pending = Some(change);
        while let Some(next) = pending.take().or_else(|| self.changes.try_recv().ok()) {
            match self.engine.handle_change(&next, self.displayed) {
                ChangeAction::Ignore => {}
                queued => {
                    action = queued;
                    merged.merge(next.change);
                    diffs += 1;
                }
            }
        }
        match action {
            ChangeAction::Ignore => {
                tracing::trace!(generation = first_generation, "ignoring diff from old query");
                None
            }
            ChangeAction::Animate => {
                tracing::debug!(diffs, ids = merged.len(), "store changed while displayed");
                self.refresh_with(RefreshKind::StoreChange, false, true, Some(merged))
            }
            ChangeAction::Reload => {
                tracing::debug!(diffs, ids = merged.len(), "store changed while hidden");
                self.refresh_with(RefreshKind::StoreChange, false, false, Some(merged))
            }
        }
    }

    /// Apply every queued store diff with at most one refresh.
    pub fn drain_changes(&mut self) -> Option<RefreshEvent> {
        let first = self.changes.try_recv().ok()?;
        self.handle_store_change(first)
    }

    fn rebuild(&mut self, kind: RefreshKind) -> Option<RefreshEvent> {
        let criteria = self.criteria.current();
        self.engine
            .refresh_controller(self.mode, criteria.group, criteria.sort);
        self.refresh_with(kind, true, false, None)
    }

    fn refresh_with(
        &mut self,
        kind: RefreshKind,
        mandatory: bool,
        animated: bool,
        changes: Option<StoreChange>,
    ) -> Option<RefreshEvent> {
        let criteria = self.criteria.current();
        let outcome = match self.engine.refresh(&criteria) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, ?kind, "refresh skipped");
                return None;
            }
        };
        let (generation, status, recomputed, changes) = match outcome {
            RefreshOutcome::Fresh {
                generation,
                results,
            } => {
                self.results = results;
                let recomputed = self
                    .window
                    .on_result_set_changed(&self.results.records, mandatory);
                if recomputed {
                    self.sync_sections();
                }
                (generation, RefreshStatus::Fresh, recomputed, changes)
            }
            RefreshOutcome::Failed { generation, error } => {
                tracing::warn!(
                    generation,
                    error = %error,
                    ?kind,
                    "fetch failed, keeping previous results"
                );
                // Rows did not change, so there is nothing to animate.
                (generation, RefreshStatus::Stale, false, None)
            }
            RefreshOutcome::Superseded { .. } => return None,
        };
        tracing::debug!(
            generation,
            ?kind,
            results = self.results.len(),
            visible = self.window.visible().len(),
            "refreshed"
        );
        Some(self.publish(generation, kind, status, animated, recomputed, changes))
    }

    fn window_changed(&mut self) -> Option<RefreshEvent> {
        self.sync_sections();
        Some(self.publish(
            self.generation(),
            RefreshKind::Window,
            RefreshStatus::Fresh,
            false,
            true,
            None,
        ))
    }

    fn sync_sections(&mut self) {
        let visible = self.window.visible().len();
        self.sections = self
            .results
            .sections
            .as_ref()
            .map(|sections| section::clip(sections, visible));
    }

    fn publish(
        &self,
        generation: u64,
        kind: RefreshKind,
        status: RefreshStatus,
        animated: bool,
        window_recomputed: bool,
        changes: Option<StoreChange>,
    ) -> RefreshEvent {
        let event = RefreshEvent {
            generation,
            kind,
            status,
            animated,
            window_recomputed,
            result_count: self.results.len(),
            visible_count: self.window.visible().len(),
            log_count: self.log_count(),
            task_count: self.task_count(),
            changes,
        };
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        event
    }
}

impl std::fmt::Debug for ConsoleListViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleListViewModel")
            .field("mode", &self.mode)
            .field("results", &self.results.len())
            .field("visible", &self.window.visible().len())
            .field("displayed", &self.displayed)
            .field("engine", &self.engine)
            .finish()
    }
}
