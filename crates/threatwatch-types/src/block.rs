use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::threat::ThreatEvent;

/// `previous_hash` value carried by a genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Free-form system record carried by non-threat blocks (genesis and other
/// bookkeeping entries).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Payload of a ledger block, decoded once at the fetch boundary.
///
/// Threat payloads are tried first; anything that does not carry the full
/// threat shape is routed to `System` rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockPayload {
    Threat(ThreatEvent),
    System(SystemRecord),
}

impl BlockPayload {
    pub fn as_threat(&self) -> Option<&ThreatEvent> {
        match self {
            BlockPayload::Threat(event) => Some(event),
            BlockPayload::System(_) => None,
        }
    }
}

/// One entry in the hash-chained append-only log.
///
/// `previous_hash` is read for parentage only; linkage is never
/// cryptographically verified here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerBlock {
    pub hash: String,
    pub previous_hash: String,
    #[serde(default)]
    pub data_hash: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "data")]
    pub payload: BlockPayload,
}

impl LedgerBlock {
    pub fn as_threat(&self) -> Option<&ThreatEvent> {
        self.payload.as_threat()
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH || self.previous_hash == "0"
    }
}

/// A decoded chain response. Chain order is the order returned by the
/// server; the engine does not re-sort it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<LedgerBlock>,
    #[serde(default)]
    pub length: usize,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<LedgerBlock>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }

    pub fn latest(&self) -> Option<&LedgerBlock> {
        self.chain.last()
    }

    /// The sub-list of threat payload blocks, flattened in chain order.
    pub fn extract_threats(&self) -> Vec<ThreatEvent> {
        self.chain
            .iter()
            .filter_map(|block| block.as_threat().cloned())
            .collect()
    }
}
