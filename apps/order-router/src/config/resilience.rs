//! Retry and circuit breaker settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

/// Resilience configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retry presets.
    #[serde(default)]
    pub retry: RetryPresets,
    /// Breaker settings shared by every named breaker.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

/// Named retry presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPresets {
    /// General-purpose policy.
    #[serde(default = "default_retry")]
    pub default: RetrySettings,
    /// Indexer and chain RPC calls.
    #[serde(default = "http_retry")]
    pub http: RetrySettings,
    /// Ledger writes.
    #[serde(default = "database_retry")]
    pub database: RetrySettings,
}

impl Default for RetryPresets {
    fn default() -> Self {
        Self {
            default: default_retry(),
            http: http_retry(),
            database: database_retry(),
        }
    }
}

/// One retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Randomize delays.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        default_retry()
    }
}

impl RetrySettings {
    fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
            jitter: policy.jitter,
        }
    }

    /// Build the runtime policy.
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_factor,
            self.jitter,
        )
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open a breaker.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Seconds a breaker stays open before probing.
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
    /// Half-open successes required to close.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Per-call timeout in seconds. Not applied to the chain breaker, whose
    /// calls are bounded by `chain.confirmation_timeout_secs`.
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout(),
            success_threshold: default_success_threshold(),
            timeout_secs: default_call_timeout(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to the resilience module's breaker config (no listener).
    #[must_use]
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.max_failures,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
            success_threshold: self.success_threshold,
            timeout: Some(Duration::from_secs(self.timeout_secs)),
            ..CircuitBreakerConfig::default()
        }
    }
}

fn default_retry() -> RetrySettings {
    RetrySettings::from_policy(&RetryPolicy::default())
}

fn http_retry() -> RetrySettings {
    RetrySettings::from_policy(&RetryPolicy::http())
}

fn database_retry() -> RetrySettings {
    RetrySettings::from_policy(&RetryPolicy::database())
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay() -> u64 {
    100
}

const fn default_max_delay() -> u64 {
    30_000
}

const fn default_backoff_factor() -> f64 {
    2.0
}

const fn default_jitter() -> bool {
    true
}

const fn default_max_failures() -> u32 {
    5
}

const fn default_reset_timeout() -> u64 {
    60
}

const fn default_success_threshold() -> u32 {
    3
}

const fn default_call_timeout() -> u64 {
    30
}
