// Tests panic on unexpected errors.
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Order Router - Rust Core Library
//!
//! Routes orders to an on-chain perpetuals exchange and keeps a local order
//! ledger consistent with the chain and its indexer.
//!
//! # Architecture (Clean Architecture + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: order aggregate and status history, market quantization,
//!   reconciliation findings
//! - **Application**: ports (`SignerPort`, `IndexerPort`, `ChainPort`),
//!   services (market cache, transaction pipeline, sync loops, reconciler)
//!   and the caller-facing `OrderRouter`
//! - **Infrastructure**: JSON-RPC broadcaster, indexer HTTP client, turso
//!   and in-memory ledgers, remote signer
//!
//! Cross-cutting: `resilience` (retry + circuit breaker around every
//! external call), `config`, `observability`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - pure types and rules.
pub mod domain;

/// Application layer - ports, services and use cases.
pub mod application;

/// Infrastructure layer - adapters for external systems.
pub mod infrastructure;

/// Retry and circuit breaker policies.
pub mod resilience;

/// YAML configuration.
pub mod config;

/// Metrics.
pub mod observability;

pub use application::ports::{ChainPort, IndexerPort, SignerPort, TxResponse};
pub use application::services::{
    MarketCache, OrderSyncService, PositionSyncService, Reconciler, TxBuilder,
};
pub use application::use_cases::{
    CancelTarget, ErrorCode, OrderRouter, OrderStatusView, PlaceOrderRequest, RouterError,
};
pub use domain::order::{Order, OrderRepository, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use domain::reconciliation::{Inconsistency, InconsistencyKind, ReconciliationResult, Severity};
pub use infrastructure::chain::Broadcaster;
pub use infrastructure::indexer::IndexerHttpClient;
pub use infrastructure::persistence::{InMemoryOrderRepository, TursoOrderRepository};
pub use infrastructure::signer::RemoteSigner;
pub use resilience::{CircuitBreakerManager, ResilientExecutor, RetryPolicy};
