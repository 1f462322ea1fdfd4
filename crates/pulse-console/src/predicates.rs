//! Mode + criteria to store predicate.
//!
//! Logs mode shows log records that are not attached to a network task. Tasks mode
//! shows task records. All mode is the union of both without the "no task"
//! restriction, so task-linked log lines reappear there.

use pulse_core::predicate::FieldPredicate;
use pulse_core::{Criteria, LogLevel, Mode, Predicate, RecordKind};

/// Predicate for `mode`; `None` when nothing is restricted.
pub fn build_predicate(mode: Mode, criteria: &Criteria) -> Option<Predicate> {
    match mode {
        Mode::Logs => logs_predicate(criteria),
        Mode::Tasks => tasks_predicate(criteria),
        Mode::All => {
            let log_parts = log_constraints(criteria);
            let task_parts = task_constraints(criteria);
            if log_parts.is_empty() && task_parts.is_empty() {
                return None;
            }
            let logs = Predicate::all(with_kind(RecordKind::Log, log_parts));
            let tasks = Predicate::all(with_kind(RecordKind::Task, task_parts));
            Predicate::any(logs.into_iter().chain(tasks).collect())
        }
    }
}

/// Logs-only predicate, also used for the log badge count.
pub fn logs_predicate(criteria: &Criteria) -> Option<Predicate> {
    let mut parts = vec![Predicate::Kind(RecordKind::Log), Predicate::NoTask];
    parts.extend(log_constraints(criteria));
    Predicate::all(parts)
}

/// Tasks-only predicate, also used for the task badge count.
pub fn tasks_predicate(criteria: &Criteria) -> Option<Predicate> {
    Predicate::all(with_kind(RecordKind::Task, task_constraints(criteria)))
}

fn with_kind(kind: RecordKind, constraints: Vec<Predicate>) -> Vec<Predicate> {
    let mut parts = Vec::with_capacity(constraints.len() + 1);
    parts.push(Predicate::Kind(kind));
    parts.extend(constraints);
    parts
}

fn log_constraints(criteria: &Criteria) -> Vec<Predicate> {
    let mut parts = shared_constraints(criteria);
    if criteria.only_errors {
        parts.push(Predicate::LevelAtLeast(LogLevel::Error));
    }
    let filters = &criteria.filters;
    if !filters.levels.is_empty() {
        parts.push(Predicate::LevelIn(filters.levels.clone()));
    }
    if !filters.labels.is_empty() {
        parts.push(Predicate::LabelIn(filters.labels.clone()));
    }
    parts
}

fn task_constraints(criteria: &Criteria) -> Vec<Predicate> {
    let mut parts = shared_constraints(criteria);
    if criteria.only_errors {
        parts.push(Predicate::TaskFailed);
    }
    parts
}

fn shared_constraints(criteria: &Criteria) -> Vec<Predicate> {
    let mut parts = Vec::new();
    let term = criteria.filter_term.trim();
    if !term.is_empty() {
        parts.push(Predicate::text_contains(term));
    }
    let range = criteria.filters.time_range;
    if !range.is_unbounded() {
        parts.push(Predicate::CreatedWithin(range));
    }
    for filter in criteria.filters.fields.iter().filter(|f| f.is_active()) {
        match FieldPredicate::compile(filter) {
            Ok(compiled) => parts.push(Predicate::Field(compiled)),
            Err(err) => {
                tracing::warn!(field = %filter.field, error = %err, "skipping field filter");
            }
        }
    }
    parts
}
