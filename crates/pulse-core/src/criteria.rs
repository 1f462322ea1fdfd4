//! Filter, sort and grouping criteria applied to the console list.
//!
//! A `Criteria` value is an immutable snapshot; every edit produces a new one.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::LogLevel;

/// Which subset of records the list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    All,
    Logs,
    Tasks,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Logs => "logs",
            Self::Tasks => "tasks",
        }
    }
}

/// Record field a structured filter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Level,
    Label,
    Message,
    Url,
    Host,
    Method,
    StatusCode,
    DurationMs,
    Error,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Level => "level",
            Self::Label => "label",
            Self::Message => "message",
            Self::Url => "url",
            Self::Host => "host",
            Self::Method => "method",
            Self::StatusCode => "status_code",
            Self::DurationMs => "duration_ms",
            Self::Error => "error",
        }
    }

    /// Whether the field belongs to log records (as opposed to tasks).
    pub fn is_log_field(self) -> bool {
        matches!(self, Self::Level | Self::Label | Self::Message)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    /// Regex match; invalid or oversized patterns are skipped.
    Matches,
    GreaterThan,
    LessThan,
}

/// One field/operator/value constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: Field,
    pub op: FilterOp,
    pub value: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl FieldFilter {
    pub fn new(field: Field, op: FilterOp, value: &str) -> Self {
        Self {
            field,
            op,
            value: value.to_owned(),
            enabled: true,
        }
    }

    /// Disabled filters and filters with a blank value impose nothing.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.value.trim().is_empty()
    }
}

/// Inclusive time range on record creation time. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Structured part of the criteria, coalesced as one field class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filters {
    /// Allowed log levels; empty means every level.
    #[serde(default)]
    pub levels: BTreeSet<LogLevel>,
    /// Allowed log labels; empty means every label.
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub fields: Vec<FieldFilter>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
            && self.labels.is_empty()
            && self.time_range.is_unbounded()
            && !self.fields.iter().any(FieldFilter::is_active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        self == Self::Ascending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    Level,
    Label,
    DurationMs,
    StatusCode,
    Host,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SortOptions {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortOptions {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Kind,
    Level,
    Label,
    Host,
    Method,
    StatusCode,
    Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupOptions {
    pub key: GroupKey,
    pub direction: SortDirection,
}

impl GroupOptions {
    pub fn new(key: GroupKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

/// Complete filter/sort/group configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub filter_term: String,
    #[serde(default)]
    pub only_errors: bool,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub sort: SortOptions,
    #[serde(default)]
    pub group: Option<GroupOptions>,
}

impl Criteria {
    /// Human-readable summary of the active constraints.
    pub fn active_label(&self) -> String {
        let mut parts = Vec::new();
        let term = self.filter_term.trim();
        if !term.is_empty() {
            parts.push(format!("text:{term}"));
        }
        if self.only_errors {
            parts.push("errors:only".to_owned());
        }
        for level in &self.filters.levels {
            parts.push(format!("level:{}", level.as_str()));
        }
        for label in &self.filters.labels {
            parts.push(format!("label:{label}"));
        }
        if !self.filters.time_range.is_unbounded() {
            parts.push("time:range".to_owned());
        }
        for filter in self.filters.fields.iter().filter(|f| f.is_active()) {
            parts.push(format!("{}:{}", filter.field, filter.value.trim()));
        }
        if parts.is_empty() {
            "none".to_owned()
        } else {
            parts.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Criteria, Field, FieldFilter, FilterOp, Filters};
    use crate::record::LogLevel;

    #[test]
    fn blank_and_disabled_field_filters_are_inactive() {
        let mut filters = Filters::default();
        filters.fields.push(FieldFilter::new(Field::Host, FilterOp::Equals, "  "));
        let mut disabled = FieldFilter::new(Field::Host, FilterOp::Equals, "example.com");
        disabled.enabled = false;
        filters.fields.push(disabled);
        assert!(filters.is_empty());
    }

    #[test]
    fn active_label_lists_constraints() {
        let mut criteria = Criteria::default();
        assert_eq!(criteria.active_label(), "none");
        criteria.filter_term = " timeout ".to_owned();
        criteria.only_errors = true;
        criteria.filters.levels.insert(LogLevel::Warning);
        criteria
            .filters
            .fields
            .push(FieldFilter::new(Field::Method, FilterOp::Equals, "POST"));
        assert_eq!(
            criteria.active_label(),
            "text:timeout errors:only level:warning method:POST"
        );
    }
}
