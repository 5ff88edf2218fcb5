use async_trait::async_trait;

use threatwatch_types::{ChainSnapshot, Result, Settings, ThreatEvent};

/// One endpoint to fetch from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: String,
    pub api_key: Option<String>,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Blockchain endpoint target from stored settings.
    pub fn chain_from(settings: &Settings) -> Self {
        Self::new(settings.blockchain_url.clone()).with_api_key(settings.api_key.clone())
    }

    /// Threat feed endpoint target from stored settings, when configured.
    pub fn feed_from(settings: &Settings) -> Option<Self> {
        settings
            .has_api_feed()
            .then(|| Self::new(settings.api_url.clone()).with_api_key(settings.api_key.clone()))
    }
}

/// Where the engine gets its data. The HTTP implementation talks to real
/// endpoints; the demo provider and test mocks implement the same seam.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_chain(&self, target: &FetchTarget) -> Result<ChainSnapshot>;
    async fn fetch_threat_feed(&self, target: &FetchTarget) -> Result<Vec<ThreatEvent>>;
}
