//! Prometheus metrics for order routing, sync and reconciliation.
//!
//! Recording functions are cheap no-ops until [`init_metrics`] installs a
//! recorder, so library code and tests can call them unconditionally.
//!
//! # Example
//!
//! ```ignore
//! use order_router::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::default())?;
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
        }
    }
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus metrics exporter.
///
/// Starts an HTTP listener that serves `/metrics`.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %config.listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

// ============================================================================
// Order Metrics
// ============================================================================

/// Record the outcome of a place-order request.
///
/// * `market` - Market ticker (e.g., "BTC-USD")
/// * `outcome` - "placed", "rejected" or "invalid"
pub fn record_order_placement(market: &str, outcome: &'static str) {
    counter!(
        "order_placements_total",
        "market" => market.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

// ============================================================================
// Sync Metrics
// ============================================================================

/// Record one background sync cycle.
///
/// * `service` - "orders" or "positions"
/// * `succeeded` - Whether the remote fetch succeeded
/// * `items` - Items processed in the cycle
pub fn record_sync_cycle(service: &'static str, succeeded: bool, items: usize) {
    counter!(
        "sync_cycles_total",
        "service" => service,
        "status" => if succeeded { "ok" } else { "error" }
    )
    .increment(1);

    gauge!("sync_items", "service" => service).set(items as f64);
}

/// Record the findings of one reconciliation pass.
pub fn record_reconciliation(total_orders: usize, inconsistencies: usize, critical: bool) {
    counter!("reconciliation_runs_total").increment(1);
    counter!("reconciliation_inconsistencies_total").increment(inconsistencies as u64);
    gauge!("reconciliation_orders_checked").set(total_orders as f64);
    gauge!("reconciliation_critical").set(if critical { 1.0 } else { 0.0 });
}

// ============================================================================
// Circuit Breaker Metrics
// ============================================================================

/// Update circuit breaker state gauge (0=closed, 1=open, 2=half_open).
pub fn record_circuit_breaker_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("circuit_breaker_state", "name" => name.to_string()).set(value);
}

/// Record a call rejected because the circuit is open.
pub fn record_circuit_breaker_rejected(name: &str) {
    counter!("circuit_breaker_rejected_total", "name" => name.to_string()).increment(1);
}
