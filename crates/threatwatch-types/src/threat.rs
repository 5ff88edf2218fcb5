use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status literal the engine treats as resolved. Every other status value
/// counts as active.
pub const STATUS_MITIGATED: &str = "Mitigated";

/// Severity of a detected threat. Closed set: the wire format carries
/// exactly these three values and nothing else is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Protocol-level metadata attached to a threat. Opaque to the engine and
/// passed through to consumers unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatDetails {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url_path: String,
    #[serde(default)]
    pub source_port: u16,
    #[serde(default)]
    pub destination_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
}

/// A detected security event.
///
/// `id` uniquely identifies the event within one connection session; the
/// seen-set and de-duplication logic rely on that holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Attacker network address. Not validated as a real IP.
    #[serde(rename = "ip")]
    pub source_ip: String,
    /// Free-text classification label; may be the literal "unknown".
    pub attack_type: String,
    pub severity: Severity,
    pub status: String,
    pub details: ThreatDetails,
    /// Optional lat/lng added by geo enrichment for map consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[f64; 2]>,
}

impl ThreatEvent {
    pub fn is_mitigated(&self) -> bool {
        self.status == STATUS_MITIGATED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: &str) -> ThreatEvent {
        ThreatEvent {
            id: "t1".into(),
            timestamp: Utc::now(),
            source_ip: "192.168.1.10".into(),
            attack_type: "SQL Injection".into(),
            severity: Severity::High,
            status: status.into(),
            details: ThreatDetails::default(),
            coordinates: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_mitigated_is_exact_literal() {
        assert!(sample("Mitigated").is_mitigated());
        assert!(!sample("mitigated").is_mitigated());
        assert!(!sample("Active").is_mitigated());
        assert!(!sample("Investigating").is_mitigated());
    }

    #[test]
    fn test_wire_shape_roundtrip() {
        let json = serde_json::json!({
            "id": "abc",
            "timestamp": "2025-04-01T12:00:00Z",
            "ip": "10.0.0.5",
            "attack_type": "XSS",
            "severity": "Medium",
            "status": "Active",
            "details": {
                "user_agent": "curl/7.64.1",
                "method": "GET",
                "url_path": "/search",
                "source_port": 52234,
                "destination_port": 443
            }
        });
        let event: ThreatEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.source_ip, "10.0.0.5");
        assert!(event.coordinates.is_none());
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let json = serde_json::json!({
            "id": "abc",
            "timestamp": "2025-04-01T12:00:00Z",
            "ip": "10.0.0.5",
            "attack_type": "XSS",
            "severity": "Critical",
            "status": "Active",
            "details": {}
        });
        assert!(serde_json::from_value::<ThreatEvent>(json).is_err());
    }
}
