//! Configuration for the order router.
//!
//! YAML with `${VAR}` / `${VAR:-default}` environment interpolation. Every
//! field has a default, so an empty document is a valid configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use order_router::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! println!("indexer: {}", config.indexer.base_url);
//! ```

mod chain;
mod indexer;
mod observability;
mod resilience;
mod signer;
mod sync;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chain::ChainConfig;
pub use indexer::IndexerConfig;
pub use observability::ObservabilityConfig;
pub use resilience::{CircuitBreakerSettings, ResilienceConfig, RetryPresets, RetrySettings};
pub use signer::{DatabaseConfig, SignerConfig};
pub use sync::SyncConfig;

use crate::application::services::parse_gas_price;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chain RPC and gas settings.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Indexer API.
    #[serde(default)]
    pub indexer: IndexerConfig,
    /// Remote signing service.
    #[serde(default)]
    pub signer: SignerConfig,
    /// Order ledger storage.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Retry and breaker policies.
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// Background loops.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Load configuration from a YAML file.
///
/// `path` defaults to [`DEFAULT_CONFIG_PATH`].
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

#[allow(clippy::expect_used)] // constant pattern
fn env_var_regex() -> &'static Regex {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();
    ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    })
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
///
/// Unset or empty variables take the default, or the empty string when no
/// default is given.
pub fn interpolate_env_vars(input: &str) -> String {
    env_var_regex()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let default = caps.get(2).map_or("", |m| m.as_str());
            match caps.get(1).map(|m| std::env::var(m.as_str())) {
                Some(Ok(value)) if !value.is_empty() => value,
                _ => default.to_string(),
            }
        })
        .into_owned()
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(message.to_string()))
    }
}

/// Validate configuration values.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    require(!config.chain.rpc_url.trim().is_empty(), "chain.rpc_url is required")?;
    require(!config.chain.chain_id.trim().is_empty(), "chain.chain_id is required")?;
    require(
        config.chain.gas_adjustment >= 1.0,
        "chain.gas_adjustment must be at least 1.0",
    )?;
    require(config.chain.gas_limit > 0, "chain.gas_limit must be positive")?;
    if parse_gas_price(&config.chain.gas_price).is_none() {
        return Err(ConfigError::ValidationError(format!(
            "chain.gas_price '{}' must be an amount followed by a denom",
            config.chain.gas_price
        )));
    }
    require(
        config.chain.confirmation_timeout_secs > 0,
        "chain.confirmation_timeout_secs must be positive",
    )?;
    require(config.chain.poll_interval_ms > 0, "chain.poll_interval_ms must be positive")?;

    require(!config.indexer.base_url.trim().is_empty(), "indexer.base_url is required")?;
    require(config.indexer.timeout_secs > 0, "indexer.timeout_secs must be positive")?;
    require(
        config.indexer.market_cache_ttl_secs > 0,
        "indexer.market_cache_ttl_secs must be positive",
    )?;

    require(!config.signer.url.trim().is_empty(), "signer.url is required")?;
    require(config.signer.timeout_secs > 0, "signer.timeout_secs must be positive")?;
    require(!config.database.path.trim().is_empty(), "database.path is required")?;

    let cb = &config.resilience.circuit_breaker;
    require(cb.max_failures >= 1, "circuit_breaker.max_failures must be at least 1")?;
    require(
        cb.success_threshold >= 1,
        "circuit_breaker.success_threshold must be at least 1",
    )?;
    require(cb.timeout_secs > 0, "circuit_breaker.timeout_secs must be positive")?;
    let retry = &config.resilience.retry;
    for (name, preset) in [
        ("default", &retry.default),
        ("http", &retry.http),
        ("database", &retry.database),
    ] {
        if preset.max_attempts == 0 || preset.backoff_factor < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "retry.{name} needs max_attempts >= 1 and backoff_factor >= 1.0"
            )));
        }
    }

    let sync = &config.sync;
    require(
        sync.order_interval_secs > 0
            && sync.position_interval_secs > 0
            && sync.reconcile_interval_secs > 0,
        "sync intervals must be positive",
    )?;
    require(sync.batch_limit > 0, "sync.batch_limit must be positive")?;

    if config.observability.metrics_enabled {
        config.observability.metrics_config()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = load_config_from_string("").unwrap();
        assert_eq!(config.chain.rpc_url, "https://rpc.dydx.trade:443");
        assert_eq!(config.chain.gas_limit, 200_000);
        assert_eq!(config.chain.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.indexer.base_url, "https://indexer.dydx.trade/v4");
        assert_eq!(config.indexer.market_cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.resilience.circuit_breaker.max_failures, 5);
        assert_eq!(config.resilience.retry.database.max_attempts, 5);
        assert_eq!(config.resilience.retry.http.initial_delay_ms, 500);
        assert_eq!(config.sync.reconcile_interval(), Duration::from_secs(300));
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "url: ${ORDER_ROUTER_TEST_UNSET_VAR:-http://localhost:26657}";
        assert_eq!(interpolate_env_vars(input), "url: http://localhost:26657");
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "address: ${ORDER_ROUTER_TEST_ALSO_UNSET}";
        assert_eq!(interpolate_env_vars(input), "address: ");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // env var syntax
    fn env_var_uses_existing_value() {
        let result = interpolate_env_vars("path: ${PATH:-fallback}");
        assert_ne!(result, "path: fallback");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn gas_adjustment_below_one_is_rejected() {
        let err = load_config_from_string("chain:\n  gas_adjustment: 0.5\n").unwrap_err();
        assert!(err.to_string().contains("gas_adjustment"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = load_config_from_string("sync:\n  order_interval_secs: 0\n").unwrap_err();
        assert!(err.to_string().contains("sync intervals"));
    }

    #[test]
    fn malformed_gas_price_is_rejected() {
        let err = load_config_from_string("chain:\n  gas_price: udydx\n").unwrap_err();
        assert!(err.to_string().contains("gas_price"));
    }

    #[test]
    fn breaker_thresholds_must_be_positive() {
        let err = load_config_from_string("resilience:\n  circuit_breaker:\n    max_failures: 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("max_failures"));
    }

    #[test]
    fn invalid_metrics_addr_only_matters_when_enabled() {
        assert!(load_config_from_string("observability:\n  metrics_addr: nope\n").is_ok());
        let err = load_config_from_string(
            "observability:\n  metrics_enabled: true\n  metrics_addr: nope\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("metrics_addr"));
    }

    #[test]
    fn loads_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
chain:
  rpc_url: "${{ORDER_ROUTER_TEST_RPC:-http://127.0.0.1:26657}}"
  chain_id: dydx-testnet-4
  gas_adjustment: 1.2
indexer:
  base_url: https://indexer.v4testnet.dydx.exchange/v4
  timeout_secs: 5
database:
  path: ":memory:"
resilience:
  retry:
    http:
      max_attempts: 4
  circuit_breaker:
    reset_timeout_secs: 10
sync:
  address: dydx1abc
  order_interval_secs: 2
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:26657");
        assert_eq!(config.chain.chain_id, "dydx-testnet-4");
        assert_eq!(config.chain.tx_builder_config().gas_adjustment, 1.2);
        assert_eq!(config.indexer.timeout(), Duration::from_secs(5));
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.resilience.retry.http.to_policy().max_attempts, 4);
        assert_eq!(
            config
                .resilience
                .circuit_breaker
                .to_resilience_config()
                .reset_timeout,
            Duration::from_secs(10)
        );
        assert_eq!(config.sync.address, "dydx1abc");
        assert_eq!(config.sync.order_interval(), Duration::from_secs(2));
        assert_eq!(config.sync.position_interval_secs, 30);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
