//! Order aggregate and its status history.
//!
//! The ledger row for an order is the single local source of truth for API
//! responses. Sizes and prices are human-readable decimals; the protocol
//! integers (quantums, subticks) are stored alongside once quantized.
//!
//! # Invariants
//!
//! - `filled_size + remaining_size == size`
//! - `filled_size >= 0` and `remaining_size >= 0`
//! - `price.is_some() == order_type.requires_price()`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};

/// Parameters for creating a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Caller-supplied client id.
    pub client_id: String,
    /// Market ticker (e.g., "BTC-USD").
    pub market: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Human-readable size in base asset units.
    pub size: Decimal,
    /// Limit price, required iff the type requires one.
    pub price: Option<Decimal>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Expiry block height, if known at creation.
    pub good_til_block: Option<u32>,
    /// Expiry wall-clock time, if any.
    pub good_til_block_time: Option<DateTime<Utc>>,
}

/// Canonical record of a routing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Internal id.
    pub id: Uuid,
    /// Caller-supplied client id.
    pub client_id: String,
    /// Exchange order id, known once placed.
    pub order_id: Option<String>,
    /// Market ticker.
    pub market: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order type.
    pub order_type: OrderType,
    /// Total size.
    pub size: Decimal,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Size in protocol quantums.
    pub quantums: Option<u64>,
    /// Price in protocol subticks.
    pub subticks: Option<u64>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Expiry block height.
    pub good_til_block: Option<u32>,
    /// Expiry wall-clock time.
    pub good_til_block_time: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Filled size.
    pub filled_size: Decimal,
    /// Unfilled size.
    pub remaining_size: Decimal,
    /// Volume-weighted fill price.
    pub average_fill_price: Option<Decimal>,
    /// Hash of the placing (or cancelling) transaction.
    pub tx_hash: Option<String>,
    /// Block that included the transaction.
    pub block_height: Option<u64>,
    /// Maker fee paid.
    pub maker_fee: Option<Decimal>,
    /// Taker fee paid.
    pub taker_fee: Option<Decimal>,
    /// Gas consumed by the transaction.
    pub gas_used: Option<u64>,
    /// Fee paid for gas.
    pub gas_fee: Option<Decimal>,
    /// Failure detail for rejected orders.
    pub error_message: Option<String>,
    /// Broadcast retries performed.
    pub retry_count: u32,
    /// Optimistic concurrency token, bumped on every ledger write.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// When the order went live.
    pub placed_at: Option<DateTime<Utc>>,
    /// When the order filled completely.
    pub filled_at: Option<DateTime<Utc>>,
    /// When the order was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a `PENDING` order after validating its parameters.
    pub fn new(params: NewOrder) -> Result<Self, OrderError> {
        if params.client_id.trim().is_empty() {
            return Err(OrderError::validation("client_id", "client id is required"));
        }
        if params.market.trim().is_empty() {
            return Err(OrderError::validation("market", "market is required"));
        }
        if params.size <= Decimal::ZERO {
            return Err(OrderError::validation("size", "size must be positive"));
        }
        match (params.order_type.requires_price(), params.price) {
            (true, None) => {
                return Err(OrderError::validation(
                    "price",
                    format!("price is required for {} orders", params.order_type),
                ));
            }
            (true, Some(price)) if price <= Decimal::ZERO => {
                return Err(OrderError::validation("price", "price must be positive"));
            }
            (false, Some(_)) => {
                return Err(OrderError::validation(
                    "price",
                    format!("price is not accepted for {} orders", params.order_type),
                ));
            }
            _ => {}
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            client_id: params.client_id,
            order_id: None,
            market: params.market,
            side: params.side,
            order_type: params.order_type,
            size: params.size,
            price: params.price,
            quantums: None,
            subticks: None,
            time_in_force: params.time_in_force,
            good_til_block: params.good_til_block,
            good_til_block_time: params.good_til_block_time,
            status: OrderStatus::Pending,
            filled_size: Decimal::ZERO,
            remaining_size: params.size,
            average_fill_price: None,
            tx_hash: None,
            block_height: None,
            maker_fee: None,
            taker_fee: None,
            gas_used: None,
            gas_fee: None,
            error_message: None,
            retry_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            placed_at: None,
            filled_at: None,
            cancelled_at: None,
        })
    }

    /// Check the size invariants.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.filled_size < Decimal::ZERO || self.remaining_size < Decimal::ZERO {
            return Err(self.invariant(format!(
                "negative size (filled {}, remaining {})",
                self.filled_size, self.remaining_size
            )));
        }
        if self.filled_size + self.remaining_size != self.size {
            return Err(self.invariant(format!(
                "filled {} + remaining {} != size {}",
                self.filled_size, self.remaining_size, self.size
            )));
        }
        Ok(())
    }

    /// Set the filled size; the remaining size follows.
    pub fn apply_fill(&mut self, filled: Decimal) -> Result<(), OrderError> {
        if filled < Decimal::ZERO || filled > self.size {
            return Err(self.invariant(format!(
                "filled size {filled} outside [0, {}]",
                self.size
            )));
        }
        self.filled_size = filled;
        self.remaining_size = self.size - filled;
        Ok(())
    }

    /// Move to `status`, stamping the matching lifecycle timestamp.
    pub fn set_status(&mut self, status: OrderStatus) {
        let now = Utc::now();
        match status {
            OrderStatus::Open if self.placed_at.is_none() => self.placed_at = Some(now),
            OrderStatus::Filled if self.filled_at.is_none() => self.filled_at = Some(now),
            OrderStatus::Cancelled if self.cancelled_at.is_none() => {
                self.cancelled_at = Some(now);
            }
            _ => {}
        }
        self.status = status;
    }

    /// Record a successful broadcast.
    pub fn mark_placed(&mut self, tx_hash: impl Into<String>, block_height: Option<u64>) {
        self.tx_hash = Some(tx_hash.into());
        self.block_height = block_height;
        self.error_message = None;
        self.set_status(OrderStatus::Open);
    }

    /// Record a failed broadcast.
    pub fn mark_rejected(&mut self, error: impl Into<String>) {
        self.error_message = Some(error.into());
        self.set_status(OrderStatus::Rejected);
    }

    /// Record a confirmed cancel.
    pub fn mark_cancelled(&mut self, tx_hash: impl Into<String>) {
        self.tx_hash = Some(tx_hash.into());
        self.set_status(OrderStatus::Cancelled);
    }

    fn invariant(&self, message: String) -> OrderError {
        OrderError::InvariantViolation {
            order_id: self.id.to_string(),
            message,
        }
    }
}

/// Append-only record of one status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    /// History row id.
    pub id: Uuid,
    /// Order the transition belongs to.
    pub order_id: Uuid,
    /// Status before the transition (`None` on creation).
    pub old_status: Option<OrderStatus>,
    /// Status after the transition.
    pub new_status: OrderStatus,
    /// Filled size snapshot.
    pub filled_size: Decimal,
    /// Remaining size snapshot.
    pub remaining_size: Decimal,
    /// Average fill price snapshot.
    pub fill_price: Option<Decimal>,
    /// Settlement evidence.
    pub tx_hash: Option<String>,
    /// Settlement block.
    pub block_height: Option<u64>,
    /// Free-text reason.
    pub reason: Option<String>,
    /// When the transition was recorded.
    pub created_at: DateTime<Utc>,
}

impl OrderStatusHistory {
    /// Snapshot `order` as having moved from `old_status` to its current status.
    #[must_use]
    pub fn record(order: &Order, old_status: Option<OrderStatus>, reason: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            old_status,
            new_status: order.status,
            filled_size: order.filled_size,
            remaining_size: order.remaining_size,
            fill_price: order.average_fill_price,
            tx_hash: order.tx_hash.clone(),
            block_height: order.block_height,
            reason: reason.map(str::to_string),
            created_at: Utc::now(),
        }
    }
}
