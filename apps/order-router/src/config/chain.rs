//! Chain RPC and transaction settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::TxBuilderConfig;

/// Chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// CometBFT JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Chain id signed into transactions.
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Base gas limit.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Gas price with denomination.
    #[serde(default = "default_gas_price")]
    pub gas_price: String,
    /// Gas limit multiplier.
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    /// Seconds to wait for block inclusion.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Milliseconds between inclusion polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Blocks an order stays valid when no expiry is given.
    #[serde(default = "default_good_til_block_offset")]
    pub good_til_block_offset: u32,
    /// Transaction memo.
    #[serde(default)]
    pub memo: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            gas_limit: default_gas_limit(),
            gas_price: default_gas_price(),
            gas_adjustment: default_gas_adjustment(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
            good_til_block_offset: default_good_til_block_offset(),
            memo: String::new(),
        }
    }
}

impl ChainConfig {
    /// Transaction pipeline settings.
    #[must_use]
    pub fn tx_builder_config(&self) -> TxBuilderConfig {
        TxBuilderConfig {
            chain_id: self.chain_id.clone(),
            gas_limit: self.gas_limit,
            gas_price: self.gas_price.clone(),
            gas_adjustment: self.gas_adjustment,
            good_til_block_offset: self.good_til_block_offset,
            memo: self.memo.clone(),
        }
    }

    /// Confirmation timeout.
    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Interval between inclusion polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_rpc_url() -> String {
    "https://rpc.dydx.trade:443".to_string()
}

fn default_chain_id() -> String {
    "dydx-mainnet-1".to_string()
}

const fn default_gas_limit() -> u64 {
    200_000
}

fn default_gas_price() -> String {
    "0.025udydx".to_string()
}

const fn default_gas_adjustment() -> f64 {
    1.5
}

const fn default_confirmation_timeout() -> u64 {
    30
}

const fn default_poll_interval() -> u64 {
    1_000
}

const fn default_good_til_block_offset() -> u32 {
    100
}
