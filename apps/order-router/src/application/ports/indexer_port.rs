//! Indexer Port (Driven Port)
//!
//! Read-only view of orders, positions and markets as derived from the chain
//! by the off-chain indexer. Wire types mirror the indexer's JSON: camelCase
//! keys and decimal values encoded as strings.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderSide;
use crate::resilience::{Retryable, is_retryable_status, is_temporary_error_message};

/// Direction of a perpetual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    /// Long exposure.
    Long,
    /// Short exposure.
    Short,
}

impl PositionSide {
    /// Order side that closes a position of this direction.
    #[must_use]
    pub const fn closing_side(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }
}

/// A perpetual position held by a subaccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Market ticker.
    pub market: String,
    /// Long or short.
    pub side: PositionSide,
    /// Signed size as reported by the indexer.
    pub size: Decimal,
    /// Largest size reached.
    #[serde(default)]
    pub max_size: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Realized profit and loss.
    #[serde(default)]
    pub realized_pnl: Decimal,
    /// Unrealized profit and loss.
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    /// Opening time.
    pub created_at: DateTime<Utc>,
    /// Opening block height.
    #[serde(default)]
    pub created_at_height: String,
    /// Total size opened.
    #[serde(default)]
    pub sum_open: Decimal,
    /// Total size closed.
    #[serde(default)]
    pub sum_close: Decimal,
    /// Net funding paid or received.
    #[serde(default)]
    pub net_funding: Decimal,
    /// Position status (`OPEN`, `CLOSED`, `LIQUIDATED`).
    pub status: String,
    /// Closing time.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// Average exit price.
    #[serde(default)]
    pub exit_price: Option<Decimal>,
}

/// Body of `GET /addresses/{address}/subaccountNumber/0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionsResponse {
    /// Positions of the subaccount.
    #[serde(default)]
    pub positions: Vec<Position>,
}

/// An order as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerOrder {
    /// Exchange order id.
    pub id: String,
    /// Protocol client id.
    pub client_id: String,
    /// Market ticker.
    #[serde(alias = "ticker")]
    pub market: String,
    /// Side.
    pub side: OrderSide,
    /// Total size.
    pub size: Decimal,
    /// Unfilled size.
    pub remaining_size: Decimal,
    /// Limit price.
    pub price: Decimal,
    /// Trigger price for conditional orders.
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
    /// Trailing percent for trailing stops.
    #[serde(default)]
    pub trailing_percent: Option<Decimal>,
    /// Order type in the indexer's vocabulary.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Status in the indexer's vocabulary.
    pub status: String,
    /// Time in force in the indexer's vocabulary.
    #[serde(default)]
    pub time_in_force: String,
    /// Post-only flag.
    #[serde(default)]
    pub post_only: bool,
    /// Reduce-only flag.
    #[serde(default)]
    pub reduce_only: bool,
    /// Order flags.
    #[serde(default)]
    pub order_flags: String,
    /// Expiry block height.
    #[serde(default)]
    pub good_til_block: Option<String>,
    /// Expiry time.
    #[serde(default)]
    pub good_til_block_time: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// When the order became unfillable.
    #[serde(default)]
    pub unfillable_at: Option<String>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Client metadata.
    #[serde(default)]
    pub client_metadata: String,
}

impl IndexerOrder {
    /// Filled size derived from the remaining size.
    #[must_use]
    pub fn filled_size(&self) -> Decimal {
        (self.size - self.remaining_size).max(Decimal::ZERO)
    }
}

/// Body of `GET /orders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdersResponse {
    /// Orders matching the query.
    #[serde(default)]
    pub orders: Vec<IndexerOrder>,
}

/// Configuration of a perpetual market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConfig {
    /// Market ticker.
    #[serde(alias = "ticker")]
    pub market: String,
    /// Market status (`ACTIVE`, `PAUSED`, ...).
    #[serde(default)]
    pub status: String,
    /// Base asset symbol.
    #[serde(default)]
    pub base_asset: String,
    /// Quote asset symbol.
    #[serde(default)]
    pub quote_asset: String,
    /// Minimum size increment in base units.
    pub step_size: Decimal,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Index price.
    #[serde(default)]
    pub index_price: Option<Decimal>,
    /// Oracle price.
    #[serde(default)]
    pub oracle_price: Option<Decimal>,
    /// 24h price change.
    #[serde(default, rename = "priceChange24H")]
    pub price_change_24h: Option<Decimal>,
    /// Next funding rate.
    #[serde(default)]
    pub next_funding_rate: Option<Decimal>,
    /// Minimum order size.
    #[serde(default)]
    pub min_order_size: Option<Decimal>,
    /// Market type.
    #[serde(default, rename = "type")]
    pub market_type: String,
    /// Initial margin fraction.
    #[serde(default)]
    pub initial_margin_fraction: Option<Decimal>,
    /// Maintenance margin fraction.
    #[serde(default)]
    pub maintenance_margin_fraction: Option<Decimal>,
    /// CLOB pair id.
    #[serde(default)]
    pub clob_pair_id: Option<String>,
    /// Size exponent.
    #[serde(default)]
    pub atomic_resolution: Option<i32>,
    /// Price conversion exponent.
    #[serde(default)]
    pub quantum_conversion_exponent: Option<i32>,
    /// Subticks per tick.
    #[serde(default)]
    pub subticks_per_tick: Option<u32>,
    /// Step in quantums.
    #[serde(default)]
    pub step_base_quantums: Option<u64>,
}

/// Body of `GET /perpetualMarkets`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketsResponse {
    /// Markets keyed by ticker.
    #[serde(default)]
    pub markets: HashMap<String, MarketConfig>,
}

/// Indexer port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexerError {
    /// Transport failure.
    #[error("failed to execute request: {message}")]
    Http {
        /// Error details.
        message: String,
    },

    /// Non-200 response.
    #[error("API request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The requested entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Requested id.
        id: String,
    },
}

impl Retryable for IndexerError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http { message } => {
                // reqwest reports connect and read failures with varied wording.
                is_temporary_error_message(message) || message.contains("error sending request")
            }
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Decode { .. } | Self::NotFound { .. } => false,
        }
    }
}

/// Port for indexer queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IndexerPort: Send + Sync {
    /// Positions of subaccount 0 of `address`.
    async fn get_positions(&self, address: &str) -> Result<PositionsResponse, IndexerError>;

    /// Orders of subaccount 0 of `address`, optionally filtered.
    async fn get_orders(
        &self,
        address: &str,
        status: Option<String>,
        market: Option<String>,
    ) -> Result<OrdersResponse, IndexerError>;

    /// A single order by exchange id.
    async fn get_order(&self, order_id: &str) -> Result<IndexerOrder, IndexerError>;

    /// All perpetual markets keyed by ticker.
    async fn get_markets(&self) -> Result<HashMap<String, MarketConfig>, IndexerError>;

    /// Configuration of one market.
    async fn get_market_config(&self, market: &str) -> Result<MarketConfig, IndexerError>;
}
