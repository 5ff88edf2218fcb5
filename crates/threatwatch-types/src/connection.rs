use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events that drive connection state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionEvent {
    ConnectRequested,
    FetchSucceeded,
    FetchFailed,
    StaleDataDetected,
    DisconnectRequested,
}

impl ConnectionState {
    /// Attempt a state transition given an event.
    /// Returns the new state or an error if the transition is invalid.
    pub fn transition(self, event: ConnectionEvent) -> super::error::Result<ConnectionState> {
        match (self, event) {
            // Disconnect is legal from every state, which makes
            // `disconnect()` idempotent.
            (_, ConnectionEvent::DisconnectRequested) => Ok(ConnectionState::Disconnected),

            // From Disconnected
            (ConnectionState::Disconnected, ConnectionEvent::ConnectRequested) => {
                Ok(ConnectionState::Connecting)
            }

            // From Connecting — the initial fetch decides
            (ConnectionState::Connecting, ConnectionEvent::FetchSucceeded) => {
                Ok(ConnectionState::Connected)
            }
            (ConnectionState::Connecting, ConnectionEvent::FetchFailed) => {
                Ok(ConnectionState::Reconnecting)
            }

            // From Connected
            (ConnectionState::Connected, ConnectionEvent::FetchSucceeded) => {
                Ok(ConnectionState::Connected)
            }
            (ConnectionState::Connected, ConnectionEvent::FetchFailed) => {
                Ok(ConnectionState::Reconnecting)
            }
            (ConnectionState::Connected, ConnectionEvent::StaleDataDetected) => {
                Ok(ConnectionState::Reconnecting)
            }

            // From Reconnecting — retries either recover or keep backing off
            (ConnectionState::Reconnecting, ConnectionEvent::FetchSucceeded) => {
                Ok(ConnectionState::Connected)
            }
            (ConnectionState::Reconnecting, ConnectionEvent::FetchFailed) => {
                Ok(ConnectionState::Reconnecting)
            }

            // All other transitions are invalid
            (state, event) => Err(EngineError::InvalidStateTransition { from: state, event }),
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn is_reconnecting(self) -> bool {
        self == ConnectionState::Reconnecting
    }
}
