//! Resilience patterns for external calls.
//!
//! Every chain RPC and indexer call runs as
//! `breaker.execute(|| retry.execute(operation))`: retries happen inside a
//! single breaker observation, so one logical call contributes exactly one
//! success or failure to the breaker regardless of how many attempts it took.

mod circuit_breaker;
mod executor;
mod retry;

use std::time::Duration;

use thiserror::Error;

pub use circuit_breaker::{
    CHAIN_TRANSACTIONS, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState,
    Counts, INDEXER_QUERIES, StateChangeListener, TripPredicate,
};
pub use executor::ResilientExecutor;
pub use retry::{Retryable, RetryPolicy, is_retryable_status, is_temporary_error_message};

/// Failure of an operation run under the resilience layer.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The breaker is open; the operation was not invoked.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Breaker name.
        name: String,
    },

    /// The operation exceeded the breaker's call timeout.
    #[error("circuit breaker '{name}' call timed out after {timeout:?}")]
    Timeout {
        /// Breaker name.
        name: String,
        /// Configured call timeout.
        timeout: Duration,
    },

    /// Every attempt failed with a retryable error.
    #[error("operation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation failed with a non-retryable error.
    #[error("{0}")]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// Returns true if the breaker rejected the call without running it.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns the underlying operation error, if any.
    #[must_use]
    pub const fn inner(&self) -> Option<&E> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Operation(e) => Some(e),
            Self::CircuitOpen { .. } | Self::Timeout { .. } | Self::Cancelled => None,
        }
    }
}
