/// Validation of inbound WebSocket frames
use thiserror::Error;

use crate::events::ClientMessage;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    Empty,

    #[error("Message too large (max {max} bytes, got {actual})")]
    TooLarge { max: usize, actual: usize },

    #[error("Message is not a recognized client event: {0}")]
    Unrecognized(String),
}

/// Parses a client text frame
///
/// Rules:
/// - Cannot be empty
/// - At most `max_bytes` long
/// - Must be a JSON object with a known `event` tag
pub fn parse_client_message(text: &str, max_bytes: usize) -> Result<ClientMessage, ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    if text.len() > max_bytes {
        return Err(ValidationError::TooLarge {
            max: max_bytes,
            actual: text.len(),
        });
    }

    serde_json::from_str(text).map_err(|e| ValidationError::Unrecognized(e.to_string()))
}
