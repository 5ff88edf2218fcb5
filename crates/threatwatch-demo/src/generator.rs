use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use threatwatch_fetch::{DataSource, FetchTarget};
use threatwatch_types::{
    BlockPayload, ChainSnapshot, GENESIS_PREVIOUS_HASH, LedgerBlock, Result, Severity,
    SystemRecord, ThreatDetails, ThreatEvent,
};

const ATTACK_TYPES: &[&str] = &[
    "SQL Injection",
    "XSS",
    "DDOS",
    "Brute Force",
    "Ransomware",
    "MITM",
    "Credential Stuffing",
    "Memory Corruption",
    "Supply Chain Attack",
    "Phishing Attack",
    "Directory Traversal",
    "Command Injection",
    "Remote Code Execution",
    "Server-Side Request Forgery",
    "Advanced Persistent Threat",
];

const PROTOCOLS: &[&str] = &[
    "HTTP", "HTTPS", "FTP", "SMTP", "SSH", "Telnet", "DNS", "WebSocket",
];

const URL_PATHS: &[&str] = &[
    "/admin/login",
    "/api/v1/users",
    "/login.php",
    "/wp-admin",
    "/dashboard",
    "/api/authenticate",
    "/checkout/payment",
    "/user/profile",
    "/search",
    "/upload",
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
    "curl/7.64.1",
    "PostmanRuntime/7.28.0",
    "python-requests/2.26.0",
];

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"];

const TCP_FLAGS: &[&str] = &["SYN", "ACK", "FIN", "RST", "PSH", "URG"];

/// How long a generated chain is reused before a fresh one is produced.
/// Regenerating on every 5-second poll would make the sample data visibly
/// teleport.
const CACHE_TTL: Duration = Duration::from_secs(30);

fn random_hex_hash<R: Rng>(rng: &mut R) -> String {
    let nonce: u128 = rng.r#gen();
    Sha256::digest(nonce.to_le_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn random_ip<R: Rng>(rng: &mut R) -> String {
    format!(
        "{}.{}.{}.{}",
        rng.gen_range(1..255u16),
        rng.gen_range(0..256u16),
        rng.gen_range(0..256u16),
        rng.gen_range(1..255u16)
    )
}

fn random_recent_timestamp<R: Rng>(rng: &mut R) -> chrono::DateTime<Utc> {
    let offset = chrono::Duration::hours(rng.gen_range(0..24))
        + chrono::Duration::minutes(rng.gen_range(0..60))
        + chrono::Duration::seconds(rng.gen_range(0..60));
    Utc::now() - offset
}

fn random_threat<R: Rng>(rng: &mut R) -> ThreatEvent {
    // 20% High / 50% Medium / 30% Low
    let severity_roll: f64 = rng.r#gen();
    let severity = if severity_roll < 0.2 {
        Severity::High
    } else if severity_roll < 0.7 {
        Severity::Medium
    } else {
        Severity::Low
    };

    // 70% active / 30% mitigated
    let status = if rng.r#gen::<f64>() < 0.7 {
        "Active"
    } else {
        "Mitigated"
    };

    ThreatEvent {
        id: Uuid::new_v4().to_string(),
        timestamp: random_recent_timestamp(rng),
        source_ip: random_ip(rng),
        attack_type: ATTACK_TYPES.choose(rng).unwrap().to_string(),
        severity,
        status: status.to_string(),
        details: ThreatDetails {
            user_agent: USER_AGENTS.choose(rng).unwrap().to_string(),
            method: METHODS.choose(rng).unwrap().to_string(),
            url_path: URL_PATHS.choose(rng).unwrap().to_string(),
            source_port: rng.gen_range(1024..u16::MAX),
            destination_port: rng.gen_range(1..u16::MAX),
            protocol: Some(PROTOCOLS.choose(rng).unwrap().to_string()),
            flag: Some(TCP_FLAGS.choose(rng).unwrap().to_string()),
        },
        coordinates: None,
    }
}

/// Generate a synthetic hash-chained block list: one genesis block plus
/// 49-68 threat blocks, sorted ascending by timestamp so "latest block"
/// logic behaves the same as with real data.
pub fn generate_demo_chain() -> ChainSnapshot {
    let mut rng = rand::thread_rng();
    let chain_length = rng.gen_range(50..70usize);

    let genesis = LedgerBlock {
        hash: random_hex_hash(&mut rng),
        previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        data_hash: random_hex_hash(&mut rng),
        timestamp: Utc::now() - chrono::Duration::hours(24),
        payload: BlockPayload::System(SystemRecord {
            message: "Genesis Block".into(),
            kind: "system".into(),
        }),
    };

    let mut chain = Vec::with_capacity(chain_length);
    chain.push(genesis);

    for i in 1..chain_length {
        let threat = random_threat(&mut rng);
        let timestamp = threat.timestamp;
        chain.push(LedgerBlock {
            hash: random_hex_hash(&mut rng),
            previous_hash: chain[i - 1].hash.clone(),
            data_hash: random_hex_hash(&mut rng),
            timestamp,
            payload: BlockPayload::Threat(threat),
        });
    }

    chain.sort_by_key(|block| block.timestamp);
    ChainSnapshot::new(chain)
}

/// Fallback data provider. Implements the same seam as the HTTP source so
/// the engine's polling and backoff behave identically on sample data.
///
/// The cached chain is instance-owned state; two providers never share it.
pub struct DemoDataSource {
    cache_ttl: Duration,
    cached: Mutex<Option<(Instant, ChainSnapshot)>>,
}

impl DemoDataSource {
    pub fn new() -> Self {
        Self::with_cache_ttl(CACHE_TTL)
    }

    pub fn with_cache_ttl(cache_ttl: Duration) -> Self {
        Self {
            cache_ttl,
            cached: Mutex::new(None),
        }
    }

    /// Current demo chain, regenerated at most once per TTL.
    pub fn current_chain(&self) -> ChainSnapshot {
        let mut cached = self.cached.lock().unwrap();
        if let Some((generated_at, snapshot)) = cached.as_ref() {
            if generated_at.elapsed() < self.cache_ttl {
                return snapshot.clone();
            }
        }
        let snapshot = generate_demo_chain();
        *cached = Some((Instant::now(), snapshot.clone()));
        snapshot
    }
}

impl Default for DemoDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for DemoDataSource {
    async fn fetch_chain(&self, _target: &FetchTarget) -> Result<ChainSnapshot> {
        Ok(self.current_chain())
    }

    async fn fetch_threat_feed(&self, _target: &FetchTarget) -> Result<Vec<ThreatEvent>> {
        Ok(self.current_chain().extract_threats())
    }
}
