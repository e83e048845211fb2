//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application and domain layers:
//!
//! - `chain/`: JSON-RPC transaction broadcaster
//! - `indexer/`: Indexer HTTP client
//! - `persistence/`: Order ledger (turso, in-memory)
//! - `signer/`: Remote signing service client

pub mod chain;
pub mod indexer;
pub mod persistence;
pub mod signer;
