//! Logging and metrics settings.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::observability::MetricsConfig;

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default level for this crate's logs (`RUST_LOG` overrides).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Start the Prometheus exporter.
    #[serde(default)]
    pub metrics_enabled: bool,
    /// Exporter listen address.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: false,
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl ObservabilityConfig {
    /// Exporter settings.
    pub fn metrics_config(&self) -> Result<MetricsConfig, ConfigError> {
        let listen_addr: SocketAddr = self.metrics_addr.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "observability.metrics_addr '{}' is invalid: {e}",
                self.metrics_addr
            ))
        })?;
        Ok(MetricsConfig { listen_addr })
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}
