//! pulse-store: record store contract, live query handles, and the in-memory
//! reference store.
//!
//! - `RecordStore` / `RecordSink`: read and write sides of an append-only log
//! - `LiveResultHandle`: fetch request bound to a change subscription
//! - `InMemoryRecordStore`: store used by tests and the demo binary
//! - `instrumentation`: network task logging with an injectable registration guard

pub mod error;
pub mod instrumentation;
pub mod live;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use live::{LiveChange, LiveListener, LiveResultHandle};
pub use memory::InMemoryRecordStore;
pub use store::{
    FetchRequest, RecordSink, RecordStore, StoreChange, StoreListener, Subscription,
    DEFAULT_FETCH_BATCH_SIZE,
};

/// Crate identity label.
pub fn crate_label() -> &'static str {
    "pulse-store"
}
