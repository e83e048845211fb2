//! Order Ledger Domain
//!
//! The order aggregate, its append-only status history, and the repository
//! port the ledger adapters implement.

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod value_objects;

pub use aggregate::{NewOrder, Order, OrderStatusHistory};
pub use errors::OrderError;
pub use repository::{DEFAULT_LIST_LIMIT, OrderFilters, OrderRepository};
pub use value_objects::{OrderSide, OrderStatus, OrderType, TimeInForce};

#[cfg(test)]
pub use repository::MockOrderRepository;
