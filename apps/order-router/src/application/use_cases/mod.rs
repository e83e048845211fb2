//! Application Use Cases
//!
//! Caller-facing operations. Transport adapters call these and map
//! [`RouterError::code`] onto their own status vocabulary.

mod errors;
mod order_router;

pub use errors::{ErrorCode, RouterError};
pub use order_router::{CancelTarget, OrderRouter, OrderStatusView, PlaceOrderRequest};
