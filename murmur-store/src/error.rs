use thiserror::Error;
use tokio_rusqlite::rusqlite;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    #[error("stream name cannot be empty")]
    EmptyStream,

    #[error("counter name cannot be empty")]
    EmptyCounter,

    #[error("desired capacity must be non-negative, got {0}")]
    NegativeCapacity(i64),
}

pub type Result<T> = std::result::Result<T, StoreError>;
