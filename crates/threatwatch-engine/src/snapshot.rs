use std::sync::Arc;

use chrono::{DateTime, Utc};

use threatwatch_types::{ChainSnapshot, ConnectionState, ThreatEvent};

use crate::stats::ThreatStats;

/// Read-only view of the engine, published over a watch channel. Consumers
/// never mutate it; the threat and chain lists are shared `Arc`s whose
/// identity is preserved across unchanged polls.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub connection_state: ConnectionState,
    pub is_loading: bool,
    pub reconnect_attempts: u32,
    pub using_fallback_data: bool,
    pub connection_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_successful_fetch_at: Option<DateTime<Utc>>,
    pub threat_data: Arc<Vec<ThreatEvent>>,
    pub blockchain_data: Option<Arc<ChainSnapshot>>,
    pub threat_stats: ThreatStats,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Disconnected,
            is_loading: false,
            reconnect_attempts: 0,
            using_fallback_data: false,
            connection_error: None,
            last_updated: None,
            last_successful_fetch_at: None,
            threat_data: Arc::new(Vec::new()),
            blockchain_data: None,
            threat_stats: ThreatStats::default(),
        }
    }
}

impl EngineSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection_state.is_connected()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.connection_state.is_reconnecting()
    }
}

/// Outcome of a manual one-shot refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub success: bool,
}
