//! Record predicates evaluated by record stores.
//!
//! Predicates form a small boolean AST. Leaves test one aspect of a record; a leaf
//! that targets a field the record kind does not carry evaluates to `false`.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::criteria::{Field, FieldFilter, FilterOp, TimeRange};
use crate::record::{LogLevel, Record, RecordBody, RecordKind};

/// Maximum accepted regex pattern length.
pub const MAX_REGEX_LEN: usize = 256;

/// Value of a record field as seen by structured filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(i64),
}

impl FieldValue<'_> {
    fn as_text(&self) -> String {
        match self {
            Self::Text(text) => (*text).to_owned(),
            Self::Number(number) => number.to_string(),
        }
    }
}

/// Look up `field` on `record`; `None` when the record kind has no such field.
pub fn field_value(record: &Record, field: Field) -> Option<FieldValue<'_>> {
    match (&record.body, field) {
        (RecordBody::Log(entry), Field::Level) => Some(FieldValue::Text(entry.level.as_str())),
        (RecordBody::Log(entry), Field::Label) => Some(FieldValue::Text(&entry.label)),
        (RecordBody::Log(entry), Field::Message) => Some(FieldValue::Text(&entry.message)),
        (RecordBody::Task(task), Field::Url) => Some(FieldValue::Text(&task.url)),
        (RecordBody::Task(task), Field::Host) => Some(FieldValue::Text(&task.host)),
        (RecordBody::Task(task), Field::Method) => Some(FieldValue::Text(&task.method)),
        (RecordBody::Task(task), Field::StatusCode) => {
            task.status_code.map(|code| FieldValue::Number(i64::from(code)))
        }
        (RecordBody::Task(task), Field::DurationMs) => task
            .duration_ms
            .map(|ms| FieldValue::Number(i64::try_from(ms).unwrap_or(i64::MAX))),
        (RecordBody::Task(task), Field::Error) => task.error.as_deref().map(FieldValue::Text),
        _ => None,
    }
}

/// Compiled form of a `FieldFilter`.
#[derive(Debug, Clone)]
pub struct FieldPredicate {
    pub field: Field,
    pub op: FilterOp,
    value: String,
    number: Option<i64>,
    regex: Option<Regex>,
}

/// Why a field filter could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFilterError {
    PatternTooLong { len: usize },
    InvalidPattern(String),
}

impl std::fmt::Display for FieldFilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PatternTooLong { len } => {
                write!(f, "regex pattern is {len} bytes, limit is {MAX_REGEX_LEN}")
            }
            Self::InvalidPattern(message) => write!(f, "invalid regex: {message}"),
        }
    }
}

impl std::error::Error for FieldFilterError {}

impl FieldPredicate {
    pub fn compile(filter: &FieldFilter) -> Result<Self, FieldFilterError> {
        let value = filter.value.trim().to_owned();
        let regex = if filter.op == FilterOp::Matches {
            if value.len() > MAX_REGEX_LEN {
                return Err(FieldFilterError::PatternTooLong { len: value.len() });
            }
            let compiled = RegexBuilder::new(&value)
                .case_insensitive(true)
                .size_limit(1 << 20)
                .build()
                .map_err(|err| FieldFilterError::InvalidPattern(err.to_string()))?;
            Some(compiled)
        } else {
            None
        };
        let number = match filter.field {
            // Levels compare by severity rank.
            Field::Level => LogLevel::parse(&value).map(LogLevel::rank),
            _ => value.parse::<i64>().ok(),
        };
        Ok(Self {
            field: filter.field,
            op: filter.op,
            value: value.to_lowercase(),
            number,
            regex,
        })
    }

    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = field_value(record, self.field) else {
            return false;
        };
        let actual_number = match (&actual, self.field) {
            (FieldValue::Number(number), _) => Some(*number),
            (FieldValue::Text(text), Field::Level) => LogLevel::parse(text).map(LogLevel::rank),
            _ => None,
        };
        let text = actual.as_text().to_lowercase();
        match self.op {
            FilterOp::Equals => text == self.value,
            FilterOp::NotEquals => text != self.value,
            FilterOp::Contains => text.contains(&self.value),
            FilterOp::NotContains => !text.contains(&self.value),
            FilterOp::Matches => self
                .regex
                .as_ref()
                .is_some_and(|regex| regex.is_match(&actual.as_text())),
            FilterOp::GreaterThan => match (actual_number, self.number) {
                (Some(lhs), Some(rhs)) => lhs > rhs,
                _ => text > self.value,
            },
            FilterOp::LessThan => match (actual_number, self.number) {
                (Some(lhs), Some(rhs)) => lhs < rhs,
                _ => text < self.value,
            },
        }
    }
}

/// Boolean predicate over records.
#[derive(Debug, Clone)]
pub enum Predicate {
    Kind(RecordKind),
    /// Log record without an associated network task.
    NoTask,
    LevelIn(BTreeSet<LogLevel>),
    LevelAtLeast(LogLevel),
    LabelIn(BTreeSet<String>),
    /// Task whose transport failed or whose status is 4xx/5xx.
    TaskFailed,
    CreatedWithin(TimeRange),
    /// Case-insensitive substring over the record's searchable text.
    TextContains(String),
    Field(FieldPredicate),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn text_contains(term: &str) -> Self {
        Self::TextContains(term.trim().to_lowercase())
    }

    /// Conjunction of `parts`; `None` when there is nothing to conjoin.
    pub fn all(parts: Vec<Predicate>) -> Option<Predicate> {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::And(flat)),
        }
    }

    /// Disjunction of `parts`; `None` when there is nothing to disjoin.
    pub fn any(parts: Vec<Predicate>) -> Option<Predicate> {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Predicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Predicate::Or(flat)),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Kind(kind) => record.kind() == *kind,
            Self::NoTask => record.as_log().is_some_and(|entry| entry.task_id.is_none()),
            Self::LevelIn(levels) => record
                .as_log()
                .is_some_and(|entry| levels.contains(&entry.level)),
            Self::LevelAtLeast(min) => record.as_log().is_some_and(|entry| entry.level >= *min),
            Self::LabelIn(labels) => record
                .as_log()
                .is_some_and(|entry| labels.contains(&entry.label)),
            Self::TaskFailed => record.as_task().is_some_and(|task| task.is_failure()),
            Self::CreatedWithin(range) => range.contains(record.created_at),
            Self::TextContains(needle) => {
                needle.is_empty() || record.search_text().contains(needle.as_str())
            }
            Self::Field(field) => field.matches(record),
            Self::Not(inner) => !inner.matches(record),
            Self::And(parts) => parts.iter().all(|part| part.matches(record)),
            Self::Or(parts) => parts.iter().any(|part| part.matches(record)),
        }
    }
}

/// Evaluate an optional predicate; `None` matches every record.
pub fn matches_optional(predicate: Option<&Predicate>, record: &Record) -> bool {
    predicate.map_or(true, |predicate| predicate.matches(record))
}
