//! Signing service and ledger storage settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Remote signing service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Base URL of the signing service.
    #[serde(default = "default_signer_url")]
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_signer_timeout")]
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            url: default_signer_url(),
            timeout_secs: default_signer_timeout(),
        }
    }
}

impl SignerConfig {
    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Order ledger database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path; `:memory:` for a throwaway ledger.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_signer_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

const fn default_signer_timeout() -> u64 {
    10
}

fn default_database_path() -> String {
    "order-router.db".to_string()
}
