//! Application Services
//!
//! The market metadata cache, the place/cancel transaction pipeline, and the
//! background sync and reconciliation loops that keep the ledger aligned
//! with the indexer.

pub mod ledger;
mod market_cache;
mod order_sync;
mod position_sync;
mod reconciler;
mod tx_builder;
mod worker;

#[cfg(test)]
mod test_support;

pub use market_cache::{DEFAULT_MARKET_CACHE_TTL, MarketCache, metadata_from_config};
pub use order_sync::{
    DEFAULT_ORDER_SYNC_INTERVAL, OrderSyncConfig, OrderSyncService, OrderSyncStats,
    map_remote_status,
};
pub use position_sync::{DEFAULT_POSITION_SYNC_INTERVAL, PositionSyncService};
pub use reconciler::{DEFAULT_RECONCILE_INTERVAL, Reconciler, ReconcilerConfig};
pub use tx_builder::{
    Fee, MARKET_ORDER_SLIPPAGE, TxBuilder, TxBuilderConfig, TxEnvelope, TxError, parse_gas_price,
    protocol_price,
};
pub use worker::{BackgroundLoop, ServiceError};
