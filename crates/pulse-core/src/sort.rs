//! Sort descriptors and grouping values.

use std::cmp::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use crate::criteria::{GroupKey, GroupOptions, SortDirection, SortKey, SortOptions};
use crate::record::{Record, RecordBody};

/// Comparable projection of a record. `Missing` sorts before any value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue<'a> {
    Missing,
    Int(i64),
    Text(&'a str),
    Session(Uuid),
}

/// What a descriptor orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Group(GroupKey),
    Record(SortKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortDescriptor {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn compare(&self, lhs: &Record, rhs: &Record) -> Ordering {
        let ordering = match self.field {
            SortField::Group(key) => group_sort_value(lhs, key).cmp(&group_sort_value(rhs, key)),
            SortField::Record(key) => sort_value(lhs, key).cmp(&sort_value(rhs, key)),
        };
        if self.direction.is_ascending() {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Descriptors for a live query: group key first when grouping, record key second.
pub fn descriptors(group: Option<GroupOptions>, sort: SortOptions) -> Vec<SortDescriptor> {
    let mut out = Vec::with_capacity(2);
    if let Some(group) = group {
        out.push(SortDescriptor {
            field: SortField::Group(group.key),
            direction: group.direction,
        });
    }
    out.push(SortDescriptor {
        field: SortField::Record(sort.key),
        direction: sort.direction,
    });
    out
}

/// Stable multi-key sort; ties fall back to record id in the direction of the
/// last descriptor so equal keys keep append order.
pub fn sort_records(records: &mut [Arc<Record>], sort: &[SortDescriptor]) {
    let tie_ascending = sort.last().map_or(true, |last| last.direction.is_ascending());
    records.sort_by(|lhs, rhs| {
        for descriptor in sort {
            let ordering = descriptor.compare(lhs, rhs);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        if tie_ascending {
            lhs.id.cmp(&rhs.id)
        } else {
            rhs.id.cmp(&lhs.id)
        }
    });
}

pub fn sort_value(record: &Record, key: SortKey) -> SortValue<'_> {
    match (key, &record.body) {
        (SortKey::CreatedAt, _) => SortValue::Int(record.created_at.timestamp_micros()),
        (SortKey::Level, RecordBody::Log(entry)) => SortValue::Int(entry.level.rank()),
        (SortKey::Label, RecordBody::Log(entry)) => SortValue::Text(&entry.label),
        (SortKey::DurationMs, RecordBody::Task(task)) => task
            .duration_ms
            .map_or(SortValue::Missing, |ms| {
                SortValue::Int(i64::try_from(ms).unwrap_or(i64::MAX))
            }),
        (SortKey::StatusCode, RecordBody::Task(task)) => task
            .status_code
            .map_or(SortValue::Missing, |code| SortValue::Int(i64::from(code))),
        (SortKey::Host, RecordBody::Task(task)) => SortValue::Text(&task.host),
        (SortKey::Url, RecordBody::Task(task)) => SortValue::Text(&task.url),
        _ => SortValue::Missing,
    }
}

pub fn group_sort_value(record: &Record, key: GroupKey) -> SortValue<'_> {
    match (key, &record.body) {
        (GroupKey::Kind, _) => SortValue::Text(record.kind().as_str()),
        (GroupKey::Level, RecordBody::Log(entry)) => SortValue::Int(entry.level.rank()),
        (GroupKey::Label, RecordBody::Log(entry)) => SortValue::Text(&entry.label),
        (GroupKey::Host, RecordBody::Task(task)) => SortValue::Text(&task.host),
        (GroupKey::Method, RecordBody::Task(task)) => SortValue::Text(&task.method),
        (GroupKey::StatusCode, RecordBody::Task(task)) => task
            .status_code
            .map_or(SortValue::Missing, |code| SortValue::Int(i64::from(code))),
        (GroupKey::Session, _) => SortValue::Session(record.session),
        _ => SortValue::Missing,
    }
}

/// Section title for `record` under `key`.
pub fn group_label(record: &Record, key: GroupKey) -> String {
    match (key, &record.body) {
        (GroupKey::Kind, _) => record.kind().as_str().to_owned(),
        (GroupKey::Level, RecordBody::Log(entry)) => entry.level.as_str().to_owned(),
        (GroupKey::Label, RecordBody::Log(entry)) => entry.label.clone(),
        (GroupKey::Host, RecordBody::Task(task)) => task.host.clone(),
        (GroupKey::Method, RecordBody::Task(task)) => task.method.clone(),
        (GroupKey::StatusCode, RecordBody::Task(task)) => task
            .status_code
            .map_or_else(|| "pending".to_owned(), |code| code.to_string()),
        // Full hex, so label order matches the byte order used for sorting.
        (GroupKey::Session, _) => record.session.simple().to_string(),
        _ => "–".to_owned(),
    }
}
