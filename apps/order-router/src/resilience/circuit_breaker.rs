//! Consecutive-failure circuit breaker for external dependencies.
//!
//! One breaker guards one dependency class (chain transactions, indexer
//! queries). Breakers are obtained by name from a [`CircuitBreakerManager`]
//! so concurrent callers of the same dependency share fate.
//!
//! # State Machine
//!
//! ```text
//! CLOSED → OPEN (should_trip: consecutive failures >= max_failures)
//! OPEN → HALF_OPEN (reset_timeout elapsed, checked on the next request)
//! HALF_OPEN → CLOSED (success_threshold consecutive successes)
//! HALF_OPEN → OPEN (any failure)
//! ```
//!
//! Counts are reset on every transition.
//!
//! # Example
//!
//! ```rust,ignore
//! use order_router::resilience::{CircuitBreakerManager, CircuitBreakerConfig, RetryPolicy};
//!
//! let manager = CircuitBreakerManager::new(CircuitBreakerConfig::default());
//! let breaker = manager.get_or_create("indexer-queries");
//! let retry = RetryPolicy::http();
//!
//! let positions = breaker
//!     .execute(|| retry.execute(&cancel, || indexer.get_positions(&address)))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::ResilienceError;
use crate::observability;

/// Breaker name for chain transaction broadcasts.
pub const CHAIN_TRANSACTIONS: &str = "chain-transactions";

/// Breaker name for indexer queries.
pub const INDEXER_QUERIES: &str = "indexer-queries";

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// Probe calls are allowed to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Request counters since the last state transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Requests observed.
    pub requests: u32,
    /// Successful requests.
    pub total_successes: u32,
    /// Failed requests.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    const fn on_success(&mut self) {
        self.requests = self.requests.saturating_add(1);
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    const fn on_failure(&mut self) {
        self.requests = self.requests.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// Callback invoked after a state transition with `(name, from, to)`.
pub type StateChangeListener = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Predicate deciding whether a closed breaker should open.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Circuit breaker configuration.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub max_failures: u32,
    /// Time spent open before allowing a probe.
    pub reset_timeout: Duration,
    /// Consecutive half-open successes required to close.
    pub success_threshold: u32,
    /// Maximum duration of a single guarded call; `None` leaves the bound
    /// to the operation itself.
    pub timeout: Option<Duration>,
    /// Optional transition listener.
    pub on_state_change: Option<StateChangeListener>,
    /// Optional override of the trip condition.
    pub should_trip: Option<TripPredicate>,
}

impl std::fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("max_failures", &self.max_failures)
            .field("reset_timeout", &self.reset_timeout)
            .field("success_threshold", &self.success_threshold)
            .field("timeout", &self.timeout)
            .field("on_state_change", &self.on_state_change.is_some())
            .field("should_trip", &self.should_trip.is_some())
            .finish()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 3,
            timeout: Some(Duration::from_secs(30)),
            on_state_change: None,
            should_trip: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Attach a state change listener.
    #[must_use]
    pub fn with_listener(mut self, listener: StateChangeListener) -> Self {
        self.on_state_change = Some(listener);
        self
    }

    /// Drop the per-call timeout. For operations that enforce their own
    /// deadline and must report it themselves.
    #[must_use]
    pub fn without_call_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Replace the default trip condition.
    #[must_use]
    pub fn with_trip_predicate(mut self, predicate: TripPredicate) -> Self {
        self.should_trip = Some(predicate);
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    counts: Counts,
    /// Deadline after which an open breaker admits a probe.
    expiry: Option<Instant>,
}

/// Circuit breaker guarding one external dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the `CLOSED` state.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                counts: Counts::default(),
                expiry: None,
            }),
        }
    }

    /// Get the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    ///
    /// An open breaker whose reset deadline has passed still reports `OPEN`
    /// until the next request moves it to `HALF_OPEN`.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Get a snapshot of the current counts.
    #[must_use]
    pub fn counts(&self) -> Counts {
        self.inner.read().counts
    }

    /// Run `operation` if the breaker admits it, recording the outcome.
    ///
    /// Rejected calls return [`ResilienceError::CircuitOpen`] without running
    /// the operation. Calls exceeding the configured timeout count as
    /// failures. Cancellation is not counted either way.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError<E>>>,
    {
        if !self.allow_request() {
            observability::record_circuit_breaker_rejected(&self.name);
            return Err(ResilienceError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        let outcome = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, operation()).await.map_err(|_| limit),
            None => Ok(operation().await),
        };

        match outcome {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(ResilienceError::Cancelled)) => Err(ResilienceError::Cancelled),
            Ok(Err(e)) => {
                self.record_failure();
                Err(e)
            }
            Err(limit) => {
                self.record_failure();
                Err(ResilienceError::Timeout {
                    name: self.name.clone(),
                    timeout: limit,
                })
            }
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// An open breaker past its reset deadline moves to `HALF_OPEN` here.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = inner.expiry.is_none_or(|expiry| Instant::now() >= expiry);
                if !expired {
                    return false;
                }
                let transition = self.transition(&mut inner, CircuitState::HalfOpen);
                drop(inner);
                self.notify(transition);
                true
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.counts.on_success();

        let transition = if inner.state == CircuitState::HalfOpen
            && inner.counts.consecutive_successes >= self.config.success_threshold
        {
            self.transition(&mut inner, CircuitState::Closed)
        } else {
            None
        };
        drop(inner);
        self.notify(transition);
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.write();
        inner.counts.on_failure();

        let transition = match inner.state {
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Closed if self.should_trip(&inner.counts) => {
                self.transition(&mut inner, CircuitState::Open)
            }
            CircuitState::Closed | CircuitState::Open => None,
        };
        drop(inner);
        self.notify(transition);
    }

    /// Force the breaker back to `CLOSED` with zeroed counts.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        let transition = self.transition(&mut inner, CircuitState::Closed);
        inner.counts = Counts::default();
        drop(inner);
        self.notify(transition);
    }

    fn should_trip(&self, counts: &Counts) -> bool {
        self.config.should_trip.as_ref().map_or_else(
            || counts.consecutive_failures >= self.config.max_failures,
            |predicate| predicate(counts),
        )
    }

    /// Apply a transition under the write lock. Returns `(from, to)` when the
    /// state actually changed.
    fn transition(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
    ) -> Option<(CircuitState, CircuitState)> {
        let from = inner.state;
        if from == to {
            return None;
        }

        inner.state = to;
        inner.counts = Counts::default();
        inner.expiry = match to {
            CircuitState::Open => Some(Instant::now() + self.config.reset_timeout),
            CircuitState::Closed | CircuitState::HalfOpen => None,
        };
        Some((from, to))
    }

    /// Log and publish a transition. Called after the lock is released.
    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };

        match to {
            CircuitState::Open => tracing::warn!(
                name = %self.name,
                from = %from,
                to = %to,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                name = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker testing"
            ),
            CircuitState::Closed => tracing::info!(
                name = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker closed"
            ),
        }

        observability::record_circuit_breaker_state(&self.name, to);

        if let Some(listener) = &self.config.on_state_change {
            listener(&self.name, from, to);
        }
    }
}

/// Registry of named circuit breakers, created lazily on first use.
#[derive(Debug)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    /// Create a manager whose breakers share `config`.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it if needed.
    ///
    /// Concurrent callers asking for the same name receive the same instance.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        // Another caller may have created it between the two locks.
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(name, "Creating circuit breaker");
            Arc::new(CircuitBreaker::new(name, self.config.clone()))
        }))
    }

    /// Like [`Self::get_or_create`], but a newly created breaker uses
    /// `config` instead of the shared one.
    pub fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(name, timeout = ?config.timeout, "Creating circuit breaker");
            Arc::new(CircuitBreaker::new(name, config))
        }))
    }

    /// The [`CHAIN_TRANSACTIONS`] breaker. Its calls are bounded by the
    /// confirmation deadline, so it has no call timeout of its own and a
    /// missed confirmation reaches the caller as such.
    pub fn chain_breaker(&self) -> Arc<CircuitBreaker> {
        self.get_or_create_with(CHAIN_TRANSACTIONS, self.config.clone().without_call_timeout())
    }

    /// Shared configuration for breakers created by [`Self::get_or_create`].
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get an existing breaker.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Remove a breaker. The next `get_or_create` starts a fresh one.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.write().remove(name)
    }

    /// Snapshot of every breaker's state.
    #[must_use]
    pub fn all(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
