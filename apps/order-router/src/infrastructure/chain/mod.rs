//! Chain Adapters
//!
//! JSON-RPC broadcaster for signed transactions.

mod broadcaster;

pub use broadcaster::{
    Broadcaster, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, tx_hash,
};
