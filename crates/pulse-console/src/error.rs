use thiserror::Error;

use pulse_store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// `refresh` ran before `refresh_controller` built a live query.
    #[error("refresh requested before a live query was established")]
    MissingLiveQuery,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("console task has shut down")]
    Closed,
    #[error("console task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
