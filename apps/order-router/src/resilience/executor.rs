//! Breaker-around-retry composition.

use std::fmt::Display;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{CircuitBreaker, ResilienceError, RetryPolicy, Retryable};

/// Runs operations as `breaker.execute(|| retry.execute(op))`.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl ResilientExecutor {
    /// Combine a shared breaker with a retry policy.
    #[must_use]
    pub const fn new(breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { breaker, retry }
    }

    /// The guarding breaker.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The retry policy applied inside the breaker.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `operation` under both policies.
    pub async fn execute<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker
            .execute(|| self.retry.execute(cancel, operation))
            .await
    }
}
