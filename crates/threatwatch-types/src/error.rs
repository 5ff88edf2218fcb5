use thiserror::Error;

use crate::connection::{ConnectionEvent, ConnectionState};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("State transition error: cannot transition from {from:?} via {event:?}")]
    InvalidStateTransition {
        from: ConnectionState,
        event: ConnectionEvent,
    },

    #[error("Invalid URL '{0}'. Check your connection settings.")]
    InvalidUrl(String),

    #[error("Request failed with status {status}")]
    HttpStatus { status: u16 },

    #[error("Request error: {0}")]
    Request(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Whether the reconnection controller should retry after this error.
    /// Configuration errors fail the connect attempt outright; everything
    /// the network or server can cause is recoverable on a later poll.
    pub fn is_transient(&self) -> bool {
        !matches!(self, EngineError::InvalidUrl(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_not_transient() {
        assert!(!EngineError::InvalidUrl("not a url".into()).is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(EngineError::HttpStatus { status: 503 }.is_transient());
        assert!(EngineError::Request("connection refused".into()).is_transient());
        assert!(EngineError::MalformedPayload("missing chain".into()).is_transient());
    }
}
