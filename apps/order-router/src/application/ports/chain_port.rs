//! Chain Port (Driven Port)
//!
//! Submission of signed transactions to a chain RPC node and confirmation
//! polling.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::resilience::{Retryable, is_retryable_status, is_temporary_error_message};

/// Result of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    /// Uppercase hex transaction hash.
    pub tx_hash: String,
    /// ABCI result code; zero on success.
    pub code: u32,
    /// Raw execution log.
    pub raw_log: String,
    /// Gas consumed.
    pub gas_used: u64,
    /// Gas requested.
    pub gas_wanted: u64,
    /// Inclusion height.
    pub height: u64,
    /// When the result was observed.
    pub timestamp: DateTime<Utc>,
}

impl TxResponse {
    /// Returns true if the transaction executed successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Chain port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Transport or JSON-RPC failure.
    #[error("rpc error: {message}")]
    Rpc {
        /// Error details.
        message: String,
    },

    /// Non-200 HTTP response from the node.
    #[error("rpc request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The node rejected the transaction at check time.
    #[error("broadcast rejected with code {code}: {log}")]
    Broadcast {
        /// ABCI code.
        code: u32,
        /// Rejection log.
        log: String,
    },

    /// The transaction was not seen in a block before the deadline.
    ///
    /// The transaction may still be included later; resubmitting blindly can
    /// double-place.
    #[error("transaction {tx_hash} not confirmed within {timeout:?}")]
    ConfirmationTimeout {
        /// Hash being polled.
        tx_hash: String,
        /// Deadline used.
        timeout: Duration,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl Retryable for ChainError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc { message } => {
                is_temporary_error_message(message) || message.contains("error sending request")
            }
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Broadcast { .. } | Self::ConfirmationTimeout { .. } | Self::Cancelled => false,
        }
    }
}

/// Port for chain transaction submission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Submit signed transaction bytes, returning the transaction hash.
    async fn broadcast_tx(&self, tx_bytes: &[u8]) -> Result<String, ChainError>;

    /// Poll until `tx_hash` is included or `timeout` elapses.
    async fn poll_confirmation(
        &self,
        tx_hash: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, ChainError>;

    /// Broadcast and wait for inclusion using the adapter's configured timeout.
    async fn broadcast_and_wait(
        &self,
        tx_bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<TxResponse, ChainError>;
}
