//! pulse-core: record model, criteria, predicates and shared configuration for the
//! Pulse console.
//!
//! Everything here is storage- and UI-agnostic. Stores evaluate `Predicate`s and
//! `SortDescriptor`s; the console crate builds them from `Criteria`.

pub mod config;
pub mod criteria;
pub mod error;
pub mod logging;
pub mod predicate;
pub mod record;
pub mod section;
pub mod sort;

pub use criteria::{
    Criteria, Field, FieldFilter, FilterOp, Filters, GroupKey, GroupOptions, Mode,
    SortDirection, SortKey, SortOptions, TimeRange,
};
pub use predicate::Predicate;
pub use record::{
    LogEntry, LogLevel, NetworkTask, NewRecord, Record, RecordBody, RecordId, RecordKind,
    TaskState,
};
pub use section::Section;
pub use sort::SortDescriptor;

/// Crate identity label.
pub fn crate_label() -> &'static str {
    "pulse-core"
}
