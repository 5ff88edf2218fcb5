use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA};
use tracing::debug;

use threatwatch_types::{ChainSnapshot, EngineError, Result, ThreatEvent};

use crate::traits::{DataSource, FetchTarget};

const USER_AGENT: &str = concat!("threatwatch/", env!("CARGO_PKG_VERSION"));

/// Check that a configured endpoint is syntactically a URL. Runs before any
/// connection attempt; a failure here is a configuration error, not a
/// transient one.
pub fn validate_url(url: &str) -> Result<()> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|_| EngineError::InvalidUrl(url.to_string()))
}

/// Decode a chain response body. JSON parse failures and a missing or
/// malformed `chain` array are distinct messages but the same error class.
pub fn decode_chain(body: &str) -> Result<ChainSnapshot> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| EngineError::MalformedPayload(format!("invalid JSON response: {e}")))?;

    if !value.get("chain").is_some_and(serde_json::Value::is_array) {
        return Err(EngineError::MalformedPayload(
            "response is missing a `chain` array".into(),
        ));
    }

    let mut snapshot: ChainSnapshot = serde_json::from_value(value)
        .map_err(|e| EngineError::MalformedPayload(format!("malformed chain entry: {e}")))?;
    snapshot.length = snapshot.chain.len();
    Ok(snapshot)
}

/// Decode a threat feed response body: a JSON array of events.
pub fn decode_threat_feed(body: &str) -> Result<Vec<ThreatEvent>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| EngineError::MalformedPayload(format!("invalid JSON response: {e}")))?;

    if !value.is_array() {
        return Err(EngineError::MalformedPayload(
            "threat feed response is not an array".into(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|e| EngineError::MalformedPayload(format!("malformed threat entry: {e}")))
}

/// HTTP data source backed by a shared `reqwest` client.
///
/// No request timeout is set: a hung request is detected indirectly by the
/// engine's staleness watchdog and aborted when superseded.
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
}

impl HttpDataSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EngineError::Request(format!("HTTP client error: {e}")))?;
        Ok(Self { client })
    }

    /// One GET with caching disabled, so every poll sees fresh server state.
    async fn get_body(&self, target: &FetchTarget) -> Result<String> {
        let mut request = self
            .client
            .get(&target.url)
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache");

        if let Some(api_key) = &target.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch_chain(&self, target: &FetchTarget) -> Result<ChainSnapshot> {
        debug!(url = %target.url, "Fetching blockchain data");
        let body = self.get_body(target).await?;
        decode_chain(&body)
    }

    async fn fetch_threat_feed(&self, target: &FetchTarget) -> Result<Vec<ThreatEvent>> {
        debug!(url = %target.url, "Fetching threat feed");
        let body = self.get_body(target).await?;
        decode_threat_feed(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://localhost:8000/chain").is_ok());
        assert!(validate_url("https://feeds.example.com/api/threats").is_ok());
        assert!(matches!(
            validate_url("not a url"),
            Err(EngineError::InvalidUrl(_))
        ));
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_decode_chain_happy_path() {
        let body = r#"{
            "chain": [
                {
                    "hash": "h1",
                    "previous_hash": "0000000000000000000000000000000000000000000000000000000000000000",
                    "data_hash": "d1",
                    "timestamp": "2025-04-01T00:00:00Z",
                    "data": { "message": "Genesis Block", "type": "system" }
                },
                {
                    "hash": "h2",
                    "previous_hash": "h1",
                    "data_hash": "d2",
                    "timestamp": "2025-04-01T01:00:00Z",
                    "data": {
                        "id": "t1",
                        "timestamp": "2025-04-01T01:00:00Z",
                        "ip": "1.2.3.4",
                        "attack_type": "XSS",
                        "severity": "Low",
                        "status": "Active",
                        "details": {}
                    }
                }
            ],
            "length": 2
        }"#;
        let snapshot = decode_chain(body).unwrap();
        assert_eq!(snapshot.length, 2);
        assert_eq!(snapshot.extract_threats().len(), 1);
    }

    #[test]
    fn test_decode_chain_invalid_json() {
        let err = decode_chain("{oops").unwrap_err();
        assert!(matches!(err, EngineError::MalformedPayload(_)));
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_decode_chain_missing_chain_field() {
        let err = decode_chain(r#"{"blocks": []}"#).unwrap_err();
        assert!(err.to_string().contains("chain"));
    }

    #[test]
    fn test_decode_chain_non_array_chain() {
        let err = decode_chain(r#"{"chain": "nope"}"#).unwrap_err();
        assert!(matches!(err, EngineError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_threat_feed_requires_array() {
        assert!(decode_threat_feed(r#"{"threats": []}"#).is_err());
        assert_eq!(decode_threat_feed("[]").unwrap().len(), 0);
    }
}
