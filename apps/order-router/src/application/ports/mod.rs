//! Application Ports (Driven)
//!
//! Capabilities the pipeline consumes: the wallet signer, the indexer read
//! API, and the chain RPC endpoint. Adapters live in `infrastructure`.

mod chain_port;
mod indexer_port;
mod signer_port;

pub use chain_port::{ChainError, ChainPort, TxResponse};
pub use indexer_port::{
    IndexerError, IndexerOrder, IndexerPort, MarketConfig, MarketsResponse, OrdersResponse,
    Position, PositionSide, PositionsResponse,
};
pub use signer_port::{SignerError, SignerPort};

#[cfg(test)]
pub use chain_port::MockChainPort;
#[cfg(test)]
pub use indexer_port::MockIndexerPort;
#[cfg(test)]
pub use signer_port::MockSignerPort;
