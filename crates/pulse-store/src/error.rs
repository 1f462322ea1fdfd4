use thiserror::Error;

use pulse_core::RecordId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
