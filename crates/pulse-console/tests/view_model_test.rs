//! View model behavior driven synchronously with explicit instants.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use pulse_console::{
    ConsoleListViewModel, RefreshEvent, RefreshKind, RefreshStatus, ScrollPosition,
};
use pulse_core::config::ConsoleConfig;
use pulse_core::{
    Filters, GroupKey, GroupOptions, LogEntry, LogLevel, Mode, NetworkTask, NewRecord, RecordId,
    SortDirection,
};
use pulse_store::{InMemoryRecordStore, RecordSink, RecordStore};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn log_record(idx: usize, message: &str) -> NewRecord {
    let at = match Utc.timestamp_opt(1_700_000_000 + idx as i64, 0).single() {
        Some(at) => at,
        None => panic!("valid timestamp"),
    };
    NewRecord::log(Uuid::nil(), LogEntry::new(LogLevel::Info, "app", message)).at(at)
}

fn task_record(idx: usize) -> NewRecord {
    let at = match Utc.timestamp_opt(1_700_000_000 + idx as i64, 0).single() {
        Some(at) => at,
        None => panic!("valid timestamp"),
    };
    let task = NetworkTask::pending("GET", &format!("https://api.example.com/items/{idx}"));
    NewRecord::task(Uuid::nil(), task).at(at)
}

fn store_with(records: Vec<NewRecord>) -> Arc<InMemoryRecordStore> {
    let store = Arc::new(InMemoryRecordStore::new());
    if let Err(err) = store.append_batch(records) {
        panic!("seed failed: {err}");
    }
    store
}

fn logs_and_tasks(logs: usize, tasks: usize) -> Arc<InMemoryRecordStore> {
    let mut records = Vec::with_capacity(logs + tasks);
    for idx in 0..logs {
        records.push(log_record(idx, &format!("log line {idx}")));
    }
    for idx in 0..tasks {
        records.push(task_record(logs + idx));
    }
    store_with(records)
}

fn view_model(store: &Arc<InMemoryRecordStore>) -> ConsoleListViewModel {
    let store: Arc<dyn RecordStore> = store.clone();
    ConsoleListViewModel::new(store, &ConsoleConfig::default())
}

fn drain(rx: &mut broadcast::Receiver<RefreshEvent>) -> Vec<RefreshEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn visible_ids(model: &ConsoleListViewModel) -> Vec<RecordId> {
    model.visible_entities().iter().map(|r| r.id).collect()
}

fn assert_window_is_prefix(model: &ConsoleListViewModel) {
    let visible = visible_ids(model);
    let results = model.result_set().ids();
    assert!(visible.len() <= model.limit());
    assert_eq!(visible.as_slice(), &results[..visible.len()]);
}

fn event(result: Option<RefreshEvent>) -> RefreshEvent {
    match result {
        Some(event) => event,
        None => panic!("expected a refresh event"),
    }
}

#[test]
fn mixed_log_of_one_thousand_records() {
    let store = logs_and_tasks(600, 400);
    let model = view_model(&store);
    assert_eq!(model.mode(), Mode::All);
    assert_eq!(model.result_set().len(), 1000);
    assert_eq!(model.log_count(), 600);
    assert_eq!(model.task_count(), 400);
    assert_eq!(model.visible_entities().len(), 100);
    assert_window_is_prefix(&model);
}

#[test]
fn burst_of_term_edits_triggers_one_refresh_with_last_value() {
    let store = logs_and_tasks(50, 50);
    let mut model = view_model(&store);
    let mut rx = model.subscribe();
    let start = Instant::now();

    for (step, term) in ["i", "it", "ite", "item", "items"].iter().enumerate() {
        let now = start + ms(step as u64 * 30);
        model.set_filter_term(term, now);
        assert!(model.tick(now).is_none());
    }
    assert!(model.tick(start + ms(249)).is_none());
    let refreshed = event(model.tick(start + ms(250)));
    assert_eq!(refreshed.kind, RefreshKind::Criteria);
    assert!(model.tick(start + ms(2000)).is_none());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(model.criteria().filter_term, "items");
    assert_eq!(model.result_set().len(), 50);
}

#[test]
fn structured_filter_edits_are_debounced() {
    let store = logs_and_tasks(10, 0);
    let mut model = view_model(&store);
    let mut rx = model.subscribe();
    let start = Instant::now();

    let mut filters = Filters::default();
    filters.levels.insert(LogLevel::Error);
    model.update_filters(filters.clone(), start);
    filters.levels.insert(LogLevel::Info);
    model.update_filters(filters, start + ms(450));

    assert!(model.tick(start + ms(600)).is_none());
    assert_eq!(model.next_deadline(), Some(start + ms(950)));
    assert!(model.tick(start + ms(950)).is_some());
    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(model.result_set().len(), 10);
}

#[test]
fn only_errors_is_delivered_on_next_tick() {
    let store = logs_and_tasks(5, 0);
    if let Err(err) = store.append(NewRecord::log(
        Uuid::nil(),
        LogEntry::new(LogLevel::Critical, "db", "pool exhausted"),
    )) {
        panic!("append failed: {err}");
    }
    let mut model = view_model(&store);
    let now = Instant::now();
    model.set_only_errors(true, now);
    let refreshed = event(model.tick(now));
    assert_eq!(refreshed.result_count, 1);
    assert_eq!(model.log_count(), 1);
}

#[test]
fn counts_are_invariant_under_mode() {
    let store = logs_and_tasks(30, 20);
    let mut model = view_model(&store);
    let mut seen = Vec::new();
    for mode in [Mode::Logs, Mode::Tasks, Mode::All] {
        let refreshed = event(model.set_mode(mode));
        assert_eq!(refreshed.kind, RefreshKind::Mode);
        seen.push((model.result_set().len(), model.log_count(), model.task_count()));
    }
    assert_eq!(seen, vec![(30, 30, 20), (20, 30, 20), (50, 30, 20)]);
}

#[test]
fn logs_mode_is_subset_of_all_mode() {
    let store = logs_and_tasks(10, 5);
    let linked = LogEntry::new(LogLevel::Error, "network", "GET failed").with_task(RecordId(11));
    if let Err(err) = store.append(NewRecord::log(Uuid::nil(), linked)) {
        panic!("append failed: {err}");
    }
    let mut model = view_model(&store);

    model.set_mode(Mode::Logs);
    let logs: HashSet<RecordId> = model.result_set().ids().into_iter().collect();
    model.set_mode(Mode::All);
    let all: HashSet<RecordId> = model.result_set().ids().into_iter().collect();

    assert_eq!(logs.len(), 10);
    assert_eq!(all.len(), 16);
    assert!(logs.is_subset(&all));
}

#[test]
fn limit_grows_at_bottom_and_resets_at_top() {
    let store = logs_and_tasks(350, 0);
    let mut model = view_model(&store);
    model.set_visible(true);
    let mut limits = vec![model.limit()];

    let first = visible_ids(&model)[0];
    model.on_appear(first);
    model.on_disappear(first);
    assert_eq!(model.scroll_position(), ScrollPosition::Middle);

    let near_end = visible_ids(&model)[98];
    let grew = event(model.on_appear(near_end));
    assert_eq!(grew.kind, RefreshKind::Window);
    limits.push(model.limit());
    model.on_disappear(near_end);

    let near_end = visible_ids(&model)[197];
    model.on_appear(near_end);
    limits.push(model.limit());
    model.on_disappear(near_end);
    assert_window_is_prefix(&model);

    model.on_appear(visible_ids(&model)[2]);
    limits.push(model.limit());

    assert_eq!(limits, vec![100, 200, 300, 100]);
    assert_eq!(model.scroll_position(), ScrollPosition::NearTop);
    assert_eq!(model.visible_entities().len(), 100);
}

#[test]
fn appear_outside_window_does_not_drive_scroll_position() {
    let store = logs_and_tasks(600, 400);
    let mut model = view_model(&store);
    let outside = model.result_set().records[150].id;

    assert!(model.on_appear(outside).is_none());
    assert_eq!(model.scroll_position(), ScrollPosition::NearTop);
    assert_eq!(model.limit(), 100);
    assert_eq!(model.visible_entities().len(), 100);
}

#[test]
fn narrowing_criteria_after_growth_shows_every_match() {
    let mut records = Vec::new();
    for idx in 0..250 {
        let message = if idx % 5 == 0 { "needle" } else { "hay" };
        records.push(log_record(idx, message));
    }
    let store = store_with(records);
    let mut model = view_model(&store);
    model.set_visible(true);

    model.on_appear(visible_ids(&model)[97]);
    assert_eq!(model.limit(), 200);
    assert_eq!(model.scroll_position(), ScrollPosition::NearBottom);

    let now = Instant::now();
    model.set_filter_term("needle", now);
    event(model.tick(now + ms(250)));

    assert_eq!(model.result_set().len(), 50);
    assert_eq!(model.visible_entities().len(), 50);
    assert_eq!(model.limit(), 200);
    assert_window_is_prefix(&model);
}

#[test]
fn repeated_refresh_is_idempotent() {
    let store = logs_and_tasks(120, 80);
    let mut model = view_model(&store);
    model.on_appear(visible_ids(&model)[50]);
    let position = model.scroll_position();
    let limit = model.limit();

    let first = event(model.refresh());
    let first_ids = model.result_set().ids();
    let second = event(model.refresh());

    assert_eq!(model.result_set().ids(), first_ids);
    assert_eq!(first.result_count, second.result_count);
    assert!(second.generation > first.generation);
    assert_eq!(model.limit(), limit);
    assert_eq!(model.scroll_position(), position);
}

#[test]
fn failed_fetch_keeps_previous_results() {
    let store = logs_and_tasks(40, 10);
    let mut model = view_model(&store);
    let before = model.result_set().ids();

    store.fail_next_fetches(1);
    let refreshed = event(model.refresh());
    assert_eq!(refreshed.status, RefreshStatus::Stale);
    assert_eq!(model.result_set().ids(), before);
    assert_eq!((model.log_count(), model.task_count()), (40, 10));

    let recovered = event(model.refresh());
    assert_eq!(recovered.status, RefreshStatus::Fresh);
}

#[test]
fn store_changes_animate_only_while_displayed() {
    let store = logs_and_tasks(3, 0);
    let mut model = view_model(&store);

    let hidden_id = match store.append(log_record(10, "while hidden")) {
        Ok(id) => id,
        Err(err) => panic!("append failed: {err}"),
    };
    let hidden = event(model.drain_changes());
    assert_eq!(hidden.kind, RefreshKind::StoreChange);
    assert!(!hidden.animated);
    assert_eq!(hidden.result_count, 4);
    let changes = match hidden.changes {
        Some(changes) => changes,
        None => panic!("store refresh should carry its diff"),
    };
    assert_eq!(changes.inserted, vec![hidden_id]);

    let shown = event(model.set_visible(true));
    assert_eq!(shown.kind, RefreshKind::Visibility);
    assert!(model.set_visible(true).is_none());

    assert!(shown.changes.is_none());

    let mut shown_ids = Vec::new();
    for idx in 0..3 {
        match store.append(log_record(20 + idx, "while shown")) {
            Ok(id) => shown_ids.push(id),
            Err(err) => panic!("append failed: {err}"),
        }
    }
    let animated = event(model.drain_changes());
    assert!(animated.animated);
    assert_eq!(animated.result_count, 7);
    let changes = match animated.changes {
        Some(changes) => changes,
        None => panic!("store refresh should carry its diff"),
    };
    assert_eq!(changes.inserted, shown_ids);
    assert!(changes.updated.is_empty());
    assert!(changes.removed.is_empty());
    assert!(model.drain_changes().is_none());
}

#[test]
fn grouped_sections_are_clipped_to_window() {
    let store = logs_and_tasks(120, 30);
    let mut model = view_model(&store);
    assert!(model.sections().is_none());

    let refreshed = event(model.set_group(Some(GroupOptions::new(
        GroupKey::Kind,
        SortDirection::Ascending,
    ))));
    assert_eq!(refreshed.kind, RefreshKind::Structure);

    let sections = match model.sections() {
        Some(sections) => sections.to_vec(),
        None => panic!("grouping should produce sections"),
    };
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].key, "log");
    assert_eq!(sections[0].range, 0..100);

    model.set_group(None);
    assert!(model.sections().is_none());
}

#[test]
fn filter_term_matches_non_ascii_text_in_any_case() {
    let store = store_with(vec![
        log_record(0, "ÉCHEC de connexion"),
        log_record(1, "Ошибка сети"),
        log_record(2, "connection ok"),
    ]);
    let mut model = view_model(&store);
    let start = Instant::now();

    model.set_filter_term("échec", start);
    event(model.tick(start + ms(250)));
    assert_eq!(model.result_set().len(), 1);

    let later = start + ms(1000);
    model.set_filter_term("ошибка", later);
    event(model.tick(later + ms(250)));
    assert_eq!(model.result_set().len(), 1);
    assert_eq!(model.result_set().records[0].created_at.timestamp(), 1_700_000_001);
}
