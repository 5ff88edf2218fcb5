use serde::{Deserialize, Serialize};

/// Advisory events emitted by the acquisition engine. Consumers use these
/// for toasts, logs and audio alerts; engine state itself travels through
/// the snapshot channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    Connected,
    Disconnected,
    ConnectionLost {
        error: String,
    },
    ReconnectScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    Reconnected,
    /// Sample data substituted for unreachable endpoints, or demo mode.
    FallbackEngaged,
    NewThreats {
        count: usize,
    },
    ThreatAlertRaised {
        threat_id: String,
        volume: u8,
    },
}
