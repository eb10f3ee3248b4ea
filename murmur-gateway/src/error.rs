use murmur_store::{Cursor, StoreError};
use thiserror::Error;

/// Errors raised by gateway operations. None of them are fatal to the
/// process; callers log and move on.
#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("store error: {0}")]
  Store(#[from] StoreError),

  #[error("malformed log record at {cursor}: {source}")]
  Decode {
    cursor: Cursor,
    #[source]
    source: serde_json::Error,
  },
}

pub type Result<T> = std::result::Result<T, GatewayError>;
