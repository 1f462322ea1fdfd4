//! pulse-console: incremental filtered view over an append-only record log.
//!
//! - `criteria_model`: criteria edits with per-field coalescing
//! - `query_engine`: predicates, live query, refresh generations, badge counts
//! - `window`: bounded visible window driven by scroll position
//! - `view_model`: orchestration and the refresh event stream
//! - `runtime`: tokio task that serializes everything above

pub mod coalescer;
pub mod criteria_model;
pub mod error;
pub mod predicates;
pub mod query_engine;
pub mod runtime;
pub mod view_model;
pub mod window;

pub use criteria_model::CriteriaModel;
pub use error::{ConsoleError, QueryError};
pub use query_engine::{ChangeAction, Counts, QueryEngine, RefreshOutcome, ResultSet};
pub use runtime::{spawn_console, ConsoleCommand, ConsoleHandle};
pub use view_model::{
    ConsoleListViewModel, ConsoleSnapshot, RefreshEvent, RefreshKind, RefreshStatus,
};
pub use window::{ScrollPosition, ViewWindowManager, WindowTransition};

/// Crate identity label.
pub fn crate_label() -> &'static str {
    "pulse-console"
}
