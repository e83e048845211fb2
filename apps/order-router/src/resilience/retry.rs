//! Retry policy with exponential backoff for chain RPC and indexer calls.
//!
//! An operation is retried only while its error classifies as transient
//! (see [`Retryable`]). Everything else is returned to the caller on the
//! first failure.
//!
//! # Backoff
//!
//! Delay before retry `n` (1-indexed, first retry after attempt 1 fails):
//!
//! ```text
//! delay(n) = min(initial_delay * backoff_factor^(n-1), max_delay)
//! ```
//!
//! With jitter enabled, each delay is perturbed by up to ±10% using the
//! operating system's random source so independent instances don't retry in
//! lockstep.
//!
//! # Retryable Errors
//!
//! | Retryable | Non-Retryable |
//! |-----------|---------------|
//! | HTTP 408/429/500/502/503/504 | HTTP 400/401/403/404/422 |
//! | Timeouts, connection refused/reset | Validation failures |
//! | "rate limit", "server busy" messages | Unknown market, invalid order state |
//!
//! # Example
//!
//! ```rust,ignore
//! use order_router::resilience::RetryPolicy;
//! use tokio_util::sync::CancellationToken;
//!
//! let policy = RetryPolicy::http();
//! let cancel = CancellationToken::new();
//! let markets = policy.execute(&cancel, || indexer.get_markets()).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::{Rng, TryRngCore};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ResilienceError;

/// Jitter magnitude as a fraction of the unjittered delay.
const JITTER_FRACTION: f64 = 0.1;

/// Error message fragments that indicate a transient failure.
const TEMPORARY_ERROR_PATTERNS: &[&str] = &[
    "timeout",
    "connection refused",
    "connection reset",
    "network is unreachable",
    "temporary failure",
    "service unavailable",
    "too many requests",
    "rate limit",
    "server busy",
    "internal server error",
    "bad gateway",
    "service temporarily unavailable",
    "gateway timeout",
];

/// HTTP status codes that are retryable.
const RETRYABLE_STATUS_CODES: &[u16] = &[
    408, // Request Timeout
    429, // Too Many Requests
    500, // Internal Server Error
    502, // Bad Gateway
    503, // Service Unavailable
    504, // Gateway Timeout
];

/// Classification of an error as transient (worth retrying) or permanent.
pub trait Retryable {
    /// Returns true when a later attempt of the same operation may succeed.
    fn is_retryable(&self) -> bool;
}

/// Check whether an error message describes a transient failure.
#[must_use]
pub fn is_temporary_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TEMPORARY_ERROR_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Check if an HTTP status code is retryable.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay (before jitter).
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// Perturb each delay by up to ±10%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings.
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
        jitter: bool,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_factor,
            jitter,
        }
    }

    /// Policy for HTTP calls (indexer, chain RPC).
    #[must_use]
    pub const fn http() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
        }
    }

    /// Policy for ledger writes: more attempts, gentler growth.
    #[must_use]
    pub const fn database() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 1.5,
            jitter: true,
        }
    }

    /// Disable jitter (deterministic delays).
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Unjittered delay before retry `attempt` (1-indexed).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_ms = self.initial_delay.as_millis() as f64 * multiplier;
        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(delay_ms.min(max_ms).max(0.0) as u64)
    }

    /// Delay before retry `attempt` (1-indexed), with jitter when enabled.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }

        // Uniform in [-1.0, 1.0)
        let draw = OsRng.try_next_u32().unwrap_or_else(|_| rand::rng().random());
        let unit = f64::from(draw % 200) / 100.0 - 1.0;
        let base_ms = base.as_millis() as f64;
        let jittered = unit.mul_add(base_ms * JITTER_FRACTION, base_ms);
        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Cancellation is checked before every attempt and interrupts both an
    /// in-flight attempt and backoff sleeps. No delay follows the final attempt.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(ResilienceError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ResilienceError::Cancelled),
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::debug!(attempt, error = %error, "Non-retryable error");
                return Err(ResilienceError::Operation(error));
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    attempts = attempt,
                    error = %error,
                    "Retry attempts exhausted"
                );
                return Err(ResilienceError::RetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.delay_for_attempt(attempt);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable error, retrying"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(ResilienceError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
