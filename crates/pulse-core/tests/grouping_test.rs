use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use pulse_core::predicate::FieldPredicate;
use pulse_core::section::{clip, partition};
use pulse_core::sort::{descriptors, sort_records};
use pulse_core::{
    Field, FieldFilter, FilterOp, GroupKey, GroupOptions, LogEntry, LogLevel, NetworkTask,
    NewRecord, Predicate, Record, RecordId, RecordKind, SortDirection, SortKey, SortOptions,
};

fn record(id: u64, new: NewRecord) -> Arc<Record> {
    let at = match Utc.timestamp_opt(1_700_000_000 + id as i64, 0).single() {
        Some(at) => at,
        None => panic!("valid timestamp"),
    };
    Arc::new(Record::from_new(RecordId(id), new.at(at)))
}

fn log(id: u64, level: LogLevel) -> Arc<Record> {
    record(
        id,
        NewRecord::log(Uuid::nil(), LogEntry::new(level, "app", "line")),
    )
}

fn task(id: u64, status: Option<u16>) -> Arc<Record> {
    let mut task = NetworkTask::pending("get", "https://api.example.com/v1/items");
    task.status_code = status;
    record(id, NewRecord::task(Uuid::nil(), task))
}

fn mixed() -> Vec<Arc<Record>> {
    vec![
        log(1, LogLevel::Info),
        task(2, Some(200)),
        log(3, LogLevel::Error),
        task(4, Some(503)),
        log(5, LogLevel::Warning),
    ]
}

fn ids(records: &[Arc<Record>]) -> Vec<u64> {
    records.iter().map(|r| r.id.0).collect()
}

#[test]
fn grouping_by_kind_orders_sections_then_time() {
    let mut records = mixed();
    let sort = descriptors(
        Some(GroupOptions::new(GroupKey::Kind, SortDirection::Ascending)),
        SortOptions::new(SortKey::CreatedAt, SortDirection::Descending),
    );
    sort_records(&mut records, &sort);
    assert_eq!(ids(&records), vec![5, 3, 1, 4, 2]);

    let sections = partition(&records, GroupKey::Kind);
    assert_eq!(sections.len(), 2);
    assert_eq!((sections[0].key.as_str(), sections[0].range.clone()), ("log", 0..3));
    assert_eq!((sections[1].key.as_str(), sections[1].range.clone()), ("task", 3..5));

    let clipped = clip(&sections, 4);
    assert_eq!(clipped.len(), 2);
    assert_eq!(clipped[1].range, 3..4);

    let clipped = clip(&sections, 2);
    assert_eq!(clipped.len(), 1);
    assert_eq!(clipped[0].range, 0..2);
}

#[test]
fn status_filter_excludes_records_without_the_field() {
    let filter = FieldFilter::new(Field::StatusCode, FilterOp::GreaterThan, "399");
    let compiled = match FieldPredicate::compile(&filter) {
        Ok(compiled) => compiled,
        Err(err) => panic!("compile failed: {err}"),
    };
    let predicate = Predicate::Field(compiled);
    let matched: Vec<u64> = mixed()
        .iter()
        .filter(|r| predicate.matches(r))
        .map(|r| r.id.0)
        .collect();
    assert_eq!(matched, vec![4]);
}

#[test]
fn composed_predicates_split_by_kind() {
    let errors = Predicate::any(vec![
        Predicate::And(vec![
            Predicate::Kind(RecordKind::Log),
            Predicate::LevelAtLeast(LogLevel::Error),
        ]),
        Predicate::And(vec![Predicate::Kind(RecordKind::Task), Predicate::TaskFailed]),
    ]);
    let errors = match errors {
        Some(predicate) => predicate,
        None => panic!("two branches should produce a predicate"),
    };
    let matched: Vec<u64> = mixed()
        .iter()
        .filter(|r| errors.matches(r))
        .map(|r| r.id.0)
        .collect();
    assert_eq!(matched, vec![3, 4]);
    assert!(Predicate::all(Vec::new()).is_none());
}
