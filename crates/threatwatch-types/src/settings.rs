use serde::{Deserialize, Serialize};

/// Connection settings, persisted under the `connection-settings` key.
///
/// Demo mode is an explicit flag; the engine never inspects URL strings for
/// sentinel values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    /// Threat feed endpoint. Empty means the feed is not polled and the
    /// consumer-visible threat list comes from the chain.
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub blockchain_url: String,
    #[serde(default)]
    pub demo_mode: bool,
}

impl Settings {
    pub fn demo() -> Self {
        Self {
            demo_mode: true,
            ..Self::default()
        }
    }

    pub fn has_api_feed(&self) -> bool {
        !self.api_url.is_empty()
    }

    pub fn has_blockchain(&self) -> bool {
        !self.blockchain_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_shape_deserializes_with_missing_fields() {
        // Settings written by older versions lack the demo flag.
        let settings: Settings = serde_json::from_str(
            r#"{"api_key":"k","api_url":"http://localhost:8000/api/threats","blockchain_url":"http://localhost:8000/chain"}"#,
        )
        .unwrap();
        assert!(!settings.demo_mode);
        assert!(settings.has_api_feed());
        assert!(settings.has_blockchain());
    }

    #[test]
    fn test_demo_settings_need_no_urls() {
        let settings = Settings::demo();
        assert!(settings.demo_mode);
        assert!(!settings.has_api_feed());
        assert!(!settings.has_blockchain());
    }
}
