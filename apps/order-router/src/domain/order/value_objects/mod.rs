//! Order Value Objects
//!
//! Enumerations shared by the ledger, the pipeline and the sync services.
//! Every enum serializes to the SCREAMING_SNAKE_CASE names stored in the
//! ledger.

mod order_side;
mod order_status;
mod order_type;
mod time_in_force;

pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use time_in_force::TimeInForce;
