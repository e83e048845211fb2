//! Indexer API settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base URL of the indexer REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HTTP client timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Market metadata cache TTL in seconds.
    #[serde(default = "default_market_cache_ttl")]
    pub market_cache_ttl_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            market_cache_ttl_secs: default_market_cache_ttl(),
        }
    }
}

impl IndexerConfig {
    /// HTTP client timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Market metadata cache TTL.
    #[must_use]
    pub const fn market_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.market_cache_ttl_secs)
    }
}

fn default_base_url() -> String {
    "https://indexer.dydx.trade/v4".to_string()
}

const fn default_timeout() -> u64 {
    30
}

const fn default_market_cache_ttl() -> u64 {
    300
}
