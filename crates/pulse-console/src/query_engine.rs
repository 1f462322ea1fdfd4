//! Live query ownership and refresh generations.
//!
//! A refresh is split in three steps so the fetch can run away from the owning
//! context: `prepare_refresh` snapshots the request under a new generation,
//! `RefreshTicket::run` talks to the store, `apply` installs the result unless a
//! newer refresh or a rebuilt live query superseded it.

use std::sync::Arc;

use serde::Serialize;

use pulse_core::section::Section;
use pulse_core::sort::descriptors;
use pulse_core::{Criteria, GroupOptions, Mode, Predicate, Record, RecordId, SortOptions};
use pulse_store::{FetchRequest, LiveChange, LiveListener, LiveResultHandle, RecordStore, StoreError};

use crate::error::QueryError;
use crate::predicates::{build_predicate, logs_predicate, tasks_predicate};

/// Ordered records plus section boundaries when grouping.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub records: Vec<Arc<Record>>,
    pub sections: Option<Vec<Section>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|record| record.id).collect()
    }
}

/// Badge counts, computed against the Logs-only and Tasks-only predicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub logs: usize,
    pub tasks: usize,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Fresh { generation: u64, results: ResultSet },
    /// The store failed; previous results and counts are untouched.
    Failed { generation: u64, error: StoreError },
    /// A newer refresh or live query already replaced this one.
    Superseded { generation: u64 },
}

/// How the owner should react to a store diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Diff came from a replaced subscription.
    Ignore,
    /// Displayed list: incremental, animated update.
    Animate,
    /// Hidden list: full recompute without animation.
    Reload,
}

/// Snapshot of one refresh, detached from the engine.
pub struct RefreshTicket {
    generation: u64,
    query_generation: u64,
    store: Arc<dyn RecordStore>,
    request: FetchRequest,
    logs: Option<Predicate>,
    tasks: Option<Predicate>,
}

/// Store answers for one ticket.
pub struct RefreshRun {
    generation: u64,
    query_generation: u64,
    fetched: Result<(Vec<Arc<Record>>, Counts), StoreError>,
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn run(self) -> RefreshRun {
        let fetched = self.fetch();
        RefreshRun {
            generation: self.generation,
            query_generation: self.query_generation,
            fetched,
        }
    }

    fn fetch(&self) -> Result<(Vec<Arc<Record>>, Counts), StoreError> {
        let records = self.store.fetch(&self.request)?;
        let counts = Counts {
            logs: self.store.count_matching(self.logs.as_ref())?,
            tasks: self.store.count_matching(self.tasks.as_ref())?,
        };
        Ok((records, counts))
    }
}

impl RefreshRun {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct QueryEngine {
    store: Arc<dyn RecordStore>,
    listener: LiveListener,
    batch_size: usize,
    mode: Mode,
    live: Option<LiveResultHandle>,
    query_generation: u64,
    issued_generation: u64,
    applied_generation: u64,
    counts: Counts,
}

impl QueryEngine {
    /// Store diffs observed by live queries are forwarded to `listener`.
    pub fn new(store: Arc<dyn RecordStore>, batch_size: usize, listener: LiveListener) -> Self {
        Self {
            store,
            listener,
            batch_size,
            mode: Mode::All,
            live: None,
            query_generation: 0,
            issued_generation: 0,
            applied_generation: 0,
            counts: Counts::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn has_live_query(&self) -> bool {
        self.live.is_some()
    }

    pub fn query_generation(&self) -> u64 {
        self.query_generation
    }

    /// Generation of the last refresh whose results were installed.
    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }

    pub fn log_count(&self) -> usize {
        self.counts.logs
    }

    pub fn task_count(&self) -> usize {
        self.counts.tasks
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    pub fn current_results(&self) -> &[Arc<Record>] {
        match &self.live {
            Some(live) => live.current_results(),
            None => &[],
        }
    }

    /// Rebuild the live query for `mode` with group-first sort descriptors. The old
    /// subscription is cancelled before the new one is opened. Returns the new
    /// query generation.
    pub fn refresh_controller(
        &mut self,
        mode: Mode,
        group: Option<GroupOptions>,
        sort: SortOptions,
    ) -> u64 {
        self.live = None;
        self.mode = mode;
        self.query_generation += 1;
        let request = FetchRequest {
            predicate: None,
            sort: descriptors(group, sort),
            group: group.map(|group| group.key),
            batch_size: self.batch_size,
        };
        let live = LiveResultHandle::open(
            Arc::clone(&self.store),
            request,
            self.query_generation,
            Arc::clone(&self.listener),
        );
        tracing::debug!(
            mode = mode.as_str(),
            generation = self.query_generation,
            grouped = group.is_some(),
            "live query rebuilt"
        );
        self.live = Some(live);
        self.query_generation
    }

    /// Swap the live query predicate and fetch synchronously.
    pub fn refresh(&mut self, criteria: &Criteria) -> Result<RefreshOutcome, QueryError> {
        let ticket = self.prepare_refresh(criteria)?;
        let run = ticket.run();
        self.apply(run)
    }

    pub fn prepare_refresh(&mut self, criteria: &Criteria) -> Result<RefreshTicket, QueryError> {
        let Some(live) = self.live.as_mut() else {
            debug_assert!(false, "refresh called before refresh_controller");
            return Err(QueryError::MissingLiveQuery);
        };
        live.set_predicate(build_predicate(self.mode, criteria));
        self.issued_generation += 1;
        Ok(RefreshTicket {
            generation: self.issued_generation,
            query_generation: self.query_generation,
            store: Arc::clone(&self.store),
            request: live.request().clone(),
            logs: logs_predicate(criteria),
            tasks: tasks_predicate(criteria),
        })
    }

    pub fn apply(&mut self, run: RefreshRun) -> Result<RefreshOutcome, QueryError> {
        let generation = run.generation;
        if generation <= self.applied_generation || run.query_generation != self.query_generation {
            tracing::debug!(
                generation,
                applied = self.applied_generation,
                "dropping superseded refresh"
            );
            return Ok(RefreshOutcome::Superseded { generation });
        }
        let Some(live) = self.live.as_mut() else {
            debug_assert!(false, "refresh applied without a live query");
            return Err(QueryError::MissingLiveQuery);
        };
        match run.fetched {
            Ok((records, counts)) => {
                live.install(records);
                self.counts = counts;
                self.applied_generation = generation;
                let results = ResultSet {
                    records: live.current_results().to_vec(),
                    sections: live.current_sections().map(<[Section]>::to_vec),
                };
                Ok(RefreshOutcome::Fresh {
                    generation,
                    results,
                })
            }
            Err(error) => Ok(RefreshOutcome::Failed { generation, error }),
        }
    }

    /// Classify a store diff for the owner. Diffs from replaced live queries are
    /// ignored.
    pub fn handle_change(&self, change: &LiveChange, displayed: bool) -> ChangeAction {
        if self.live.is_none() || change.generation != self.query_generation {
            return ChangeAction::Ignore;
        }
        if displayed {
            ChangeAction::Animate
        } else {
            ChangeAction::Reload
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("mode", &self.mode)
            .field("query_generation", &self.query_generation)
            .field("applied_generation", &self.applied_generation)
            .field("counts", &self.counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use pulse_core::{
        Criteria, GroupKey, GroupOptions, LogEntry, LogLevel, Mode, NetworkTask, NewRecord,
        SortDirection, SortKey, SortOptions,
    };
    use pulse_store::{InMemoryRecordStore, LiveChange, StoreChange};

    use super::{ChangeAction, QueryEngine, RefreshOutcome};

    fn seeded(logs: usize, tasks: usize) -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut batch = Vec::new();
        for idx in 0..logs {
            let entry = LogEntry::new(LogLevel::Info, "app", &format!("line {idx}"));
            batch.push(NewRecord::log(Uuid::nil(), entry));
        }
        for idx in 0..tasks {
            let task = NetworkTask::pending("GET", &format!("https://example.com/{idx}"));
            batch.push(NewRecord::task(Uuid::nil(), task));
        }
        if let Err(err) = store.append_batch(batch) {
            panic!("seed failed: {err}");
        }
        store
    }

    fn engine(store: &Arc<InMemoryRecordStore>) -> QueryEngine {
        QueryEngine::new(store.clone(), 100, Arc::new(|_: LiveChange| {}))
    }

    fn fresh_len(outcome: RefreshOutcome) -> usize {
        match outcome {
            RefreshOutcome::Fresh { results, .. } => results.len(),
            other => panic!("expected fresh results, got {other:?}"),
        }
    }

    fn sort() -> SortOptions {
        SortOptions::new(SortKey::CreatedAt, SortDirection::Descending)
    }

    #[test]
    fn counts_do_not_depend_on_mode() {
        let store = seeded(6, 4);
        let mut engine = engine(&store);
        let criteria = Criteria::default();
        for mode in [Mode::All, Mode::Logs, Mode::Tasks] {
            engine.refresh_controller(mode, None, sort());
            let len = match engine.refresh(&criteria) {
                Ok(outcome) => fresh_len(outcome),
                Err(err) => panic!("refresh failed: {err}"),
            };
            let expected = match mode {
                Mode::All => 10,
                Mode::Logs => 6,
                Mode::Tasks => 4,
            };
            assert_eq!(len, expected);
            assert_eq!((engine.log_count(), engine.task_count()), (6, 4));
        }
    }

    #[test]
    fn stale_run_is_dropped() {
        let store = seeded(3, 0);
        let mut engine = engine(&store);
        engine.refresh_controller(Mode::All, None, sort());
        let criteria = Criteria::default();
        let first = match engine.prepare_refresh(&criteria) {
            Ok(ticket) => ticket,
            Err(err) => panic!("prepare failed: {err}"),
        };
        let second = match engine.prepare_refresh(&criteria) {
            Ok(ticket) => ticket,
            Err(err) => panic!("prepare failed: {err}"),
        };
        let first_run = first.run();
        let second_run = second.run();

        assert!(matches!(
            engine.apply(second_run),
            Ok(RefreshOutcome::Fresh { generation: 2, .. })
        ));
        assert!(matches!(
            engine.apply(first_run),
            Ok(RefreshOutcome::Superseded { generation: 1 })
        ));
        assert_eq!(engine.applied_generation(), 2);
    }

    #[test]
    fn run_from_replaced_live_query_is_dropped() {
        let store = seeded(3, 0);
        let mut engine = engine(&store);
        engine.refresh_controller(Mode::All, None, sort());
        let ticket = match engine.prepare_refresh(&Criteria::default()) {
            Ok(ticket) => ticket,
            Err(err) => panic!("prepare failed: {err}"),
        };
        engine.refresh_controller(Mode::Logs, None, sort());
        assert!(matches!(
            engine.apply(ticket.run()),
            Ok(RefreshOutcome::Superseded { .. })
        ));
    }

    #[test]
    fn failed_fetch_keeps_previous_counts() {
        let store = seeded(2, 1);
        let mut engine = engine(&store);
        engine.refresh_controller(Mode::All, None, sort());
        assert!(engine.refresh(&Criteria::default()).is_ok());
        store.fail_next_fetches(1);
        assert!(matches!(
            engine.refresh(&Criteria::default()),
            Ok(RefreshOutcome::Failed { .. })
        ));
        assert_eq!((engine.log_count(), engine.task_count()), (2, 1));
        assert_eq!(engine.current_results().len(), 3);
    }

    #[test]
    fn grouped_query_returns_sections() {
        let store = seeded(2, 3);
        let mut engine = engine(&store);
        let group = GroupOptions::new(GroupKey::Kind, SortDirection::Ascending);
        engine.refresh_controller(Mode::All, Some(group), sort());
        let results = match engine.refresh(&Criteria::default()) {
            Ok(RefreshOutcome::Fresh { results, .. }) => results,
            other => panic!("expected fresh results, got {other:?}"),
        };
        let sections = results.sections.unwrap_or_default();
        let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["log", "task"]);
        assert_eq!(sections[1].range, 2..5);
    }

    #[test]
    fn changes_from_old_generation_are_ignored() {
        let store = seeded(1, 0);
        let mut engine = engine(&store);
        let old = engine.refresh_controller(Mode::All, None, sort());
        let current = engine.refresh_controller(Mode::Logs, None, sort());
        let change = |generation| LiveChange {
            generation,
            change: StoreChange::default(),
        };
        assert_eq!(engine.handle_change(&change(old), true), ChangeAction::Ignore);
        assert_eq!(engine.handle_change(&change(current), true), ChangeAction::Animate);
        assert_eq!(engine.handle_change(&change(current), false), ChangeAction::Reload);
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn refresh_without_live_query_is_an_error_in_release() {
        let store = seeded(1, 0);
        let mut engine = engine(&store);
        assert_eq!(
            engine.refresh(&Criteria::default()).err(),
            Some(super::QueryError::MissingLiveQuery)
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "refresh called before refresh_controller")]
    fn refresh_without_live_query_panics_in_debug() {
        let store = seeded(1, 0);
        let mut engine = engine(&store);
        let _ = engine.refresh(&Criteria::default());
    }
}
