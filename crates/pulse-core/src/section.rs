//! Section boundaries over a grouped result set.

use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;

use crate::criteria::GroupKey;
use crate::record::Record;
use crate::sort::group_label;

/// Contiguous run of records sharing one group value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub key: String,
    pub range: Range<usize>,
}

impl Section {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Partition `records` (already sorted group-key first) into sections.
pub fn partition(records: &[Arc<Record>], key: GroupKey) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let label = group_label(record, key);
        match sections.last_mut() {
            Some(last) if last.key == label => last.range.end = idx + 1,
            _ => sections.push(Section {
                key: label,
                range: idx..idx + 1,
            }),
        }
    }
    sections
}

/// Sections restricted to the first `len` records; empty sections are dropped.
pub fn clip(sections: &[Section], len: usize) -> Vec<Section> {
    sections
        .iter()
        .filter(|section| section.range.start < len)
        .map(|section| Section {
            key: section.key.clone(),
            range: section.range.start..section.range.end.min(len),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{clip, partition, Section};
    use crate::criteria::GroupKey;
    use crate::record::{LogEntry, LogLevel, Record, RecordBody, RecordId};

    fn log(id: u64, level: LogLevel) -> Arc<Record> {
        Arc::new(Record {
            id: RecordId(id),
            created_at: Utc::now(),
            session: Uuid::nil(),
            body: RecordBody::Log(LogEntry::new(level, "app", "msg")),
        })
    }

    #[test]
    fn partition_groups_consecutive_runs() {
        let records = vec![
            log(1, LogLevel::Error),
            log(2, LogLevel::Error),
            log(3, LogLevel::Info),
        ];
        let sections = partition(&records, GroupKey::Level);
        assert_eq!(
            sections,
            vec![
                Section {
                    key: "error".to_owned(),
                    range: 0..2
                },
                Section {
                    key: "info".to_owned(),
                    range: 2..3
                },
            ]
        );
        assert!(partition(&[], GroupKey::Level).is_empty());
    }

    #[test]
    fn clip_truncates_to_window() {
        let sections = vec![
            Section {
                key: "a".to_owned(),
                range: 0..3,
            },
            Section {
                key: "b".to_owned(),
                range: 3..10,
            },
        ];
        let clipped = clip(&sections, 2);
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].range, 0..2);
        assert_eq!(clip(&sections, 5)[1].range, 3..5);
    }
}
