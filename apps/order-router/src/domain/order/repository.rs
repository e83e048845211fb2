//! Order Repository Trait
//!
//! Persistence abstraction for the order ledger. Implemented by adapters in
//! the infrastructure layer (turso, in-memory).
//!
//! Every status change written through [`OrderRepository::update_order`]
//! appends an [`OrderStatusHistory`] row; history is never updated or
//! deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::{Order, OrderStatusHistory};
use super::errors::OrderError;
use super::value_objects::{OrderSide, OrderStatus, OrderType};

/// Default page size for order listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Filters for [`OrderRepository::list_orders`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilters {
    /// Market ticker.
    pub market: Option<String>,
    /// Order side.
    pub side: Option<OrderSide>,
    /// Order type.
    pub order_type: Option<OrderType>,
    /// Order status.
    pub status: Option<OrderStatus>,
    /// Only orders created at or after this time.
    pub created_after: Option<DateTime<Utc>>,
    /// Only orders created at or before this time.
    pub created_before: Option<DateTime<Utc>>,
    /// Page size.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}

impl OrderFilters {
    /// Returns true if `order` satisfies every set filter.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.market.as_ref().is_none_or(|m| *m == order.market)
            && self.side.is_none_or(|s| s == order.side)
            && self.order_type.is_none_or(|t| t == order.order_type)
            && self.status.is_none_or(|s| s == order.status)
            && self.created_after.is_none_or(|t| order.created_at >= t)
            && self.created_before.is_none_or(|t| order.created_at <= t)
    }
}

/// Repository trait for order persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order and its initial history row.
    async fn create_order(&self, order: &Order) -> Result<(), OrderError>;

    /// Find an order by internal id.
    async fn get_order_by_id(&self, id: Uuid) -> Result<Order, OrderError>;

    /// Find an order by client id.
    async fn get_order_by_client_id(&self, client_id: &str) -> Result<Order, OrderError>;

    /// Find an order by exchange order id.
    async fn get_order_by_order_id(&self, order_id: &str) -> Result<Order, OrderError>;

    /// Write `order` back to the ledger.
    ///
    /// Fails with [`OrderError::ConcurrentModification`] if the stored
    /// version differs from `order.version`. On success `order.version` and
    /// `order.updated_at` are advanced. A status change appends a history
    /// row carrying `reason`.
    async fn update_order(&self, order: &mut Order, reason: Option<String>)
    -> Result<(), OrderError>;

    /// Delete an order and its history.
    async fn delete_order(&self, id: Uuid) -> Result<(), OrderError>;

    /// List orders matching `filters`, newest first.
    async fn list_orders(&self, filters: &OrderFilters) -> Result<Vec<Order>, OrderError>;

    /// List `OPEN`/`PARTIALLY_FILLED` orders, optionally for one market.
    async fn list_active_orders(&self, market: Option<String>) -> Result<Vec<Order>, OrderError>;

    /// List orders in `status`, newest first.
    async fn list_orders_by_status(
        &self,
        status: OrderStatus,
        limit: u32,
    ) -> Result<Vec<Order>, OrderError>;

    /// Count orders in `status`.
    async fn count_orders_by_status(&self, status: OrderStatus) -> Result<u64, OrderError>;

    /// Status history of an order, oldest first.
    async fn get_order_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, OrderError>;

    /// Append a history row.
    async fn create_order_status_history(
        &self,
        history: &OrderStatusHistory,
    ) -> Result<(), OrderError>;

    /// Set the status of several orders, appending history for each change.
    /// Returns the number of orders whose status changed.
    async fn update_orders_status(
        &self,
        ids: &[Uuid],
        status: OrderStatus,
    ) -> Result<u64, OrderError>;

    /// Orders the sync services should track, least recently updated first.
    async fn get_orders_for_sync(&self, limit: u32) -> Result<Vec<Order>, OrderError>;
}
