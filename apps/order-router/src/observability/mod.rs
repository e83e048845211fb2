//! Observability: Prometheus metrics for the order pipeline.
//!
//! Structured logging is handled by `tracing` at each call site; this module
//! only owns metric names and the exporter.

mod metrics;

pub use self::metrics::{
    MetricsConfig, MetricsError, init_metrics, record_circuit_breaker_rejected,
    record_circuit_breaker_state, record_order_placement, record_reconciliation,
    record_sync_cycle,
};
