//! Indexer Adapters
//!
//! HTTP client for the exchange indexer's read API.

mod http_client;

pub use http_client::{DEFAULT_INDEXER_TIMEOUT, IndexerHttpClient};
