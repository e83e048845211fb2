//! Errors returned by the caller-facing operations.
//!
//! Every lower-layer error is folded into [`RouterError`], which carries a
//! stable [`ErrorCode`] for the transport layer and says whether the caller
//! may retry.
//!
//! | Code | Retryable | Source |
//! |------|-----------|--------|
//! | `VALIDATION_ERROR` | no | bad parameters, quantization |
//! | `INVALID_MARKET` | no | unknown market |
//! | `INVALID_ORDER_STATE` | no | cancel of a non-cancellable order |
//! | `ORDER_NOT_FOUND` | no | unknown id |
//! | `POSITION_NOT_FOUND` | no | no open position in the market |
//! | `CIRCUIT_BREAKER_OPEN` | yes | breaker rejected the call |
//! | `TIMEOUT` | yes | call deadline |
//! | `TIMEOUT` | no | broadcast but unconfirmed; the order stays `PENDING` |
//! | `SERVICE_UNAVAILABLE` | yes | retries exhausted, indexer down |
//! | `DATABASE_ERROR` | no | ledger failure |
//! | `WALLET_ERROR` | no | signer failure |
//! | `TRANSACTION_FAILED` | no | rejected or failed on chain |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{ChainError, IndexerError, SignerError};
use crate::application::services::{ServiceError, TxError};
use crate::domain::market::MarketError;
use crate::domain::order::{OrderError, OrderStatus};
use crate::resilience::ResilienceError;

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid request parameters.
    ValidationError,
    /// Unknown market.
    InvalidMarket,
    /// Operation not allowed in the order's status.
    InvalidOrderState,
    /// Order not found.
    OrderNotFound,
    /// No position in the market.
    PositionNotFound,
    /// Dependency breaker open.
    CircuitBreakerOpen,
    /// Deadline elapsed.
    Timeout,
    /// Dependency unavailable after retries.
    ServiceUnavailable,
    /// Ledger failure.
    DatabaseError,
    /// Signer failure.
    WalletError,
    /// Transaction rejected or failed on chain.
    TransactionFailed,
}

impl ErrorCode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidMarket => "INVALID_MARKET",
            Self::InvalidOrderState => "INVALID_ORDER_STATE",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::PositionNotFound => "POSITION_NOT_FOUND",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::Timeout => "TIMEOUT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::WalletError => "WALLET_ERROR",
            Self::TransactionFailed => "TRANSACTION_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from an [`OrderRouter`](super::OrderRouter) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Invalid parameters.
    #[error("validation error on '{field}': {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// Details.
        message: String,
    },

    /// Unknown market.
    #[error("invalid market: {market}")]
    InvalidMarket {
        /// Requested market.
        market: String,
    },

    /// The order's status does not allow the operation.
    #[error("cannot {operation} order {order_id} in status {status}")]
    InvalidOrderState {
        /// Internal order id.
        order_id: String,
        /// Current status.
        status: OrderStatus,
        /// Attempted operation.
        operation: &'static str,
    },

    /// No order with this id.
    #[error("order not found: {id}")]
    OrderNotFound {
        /// Id used for the lookup.
        id: String,
    },

    /// No open position in the market.
    #[error("no open position found for market: {market}")]
    PositionNotFound {
        /// Requested market.
        market: String,
    },

    /// A dependency's breaker is open.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Breaker name.
        name: String,
    },

    /// A deadline elapsed.
    #[error("timed out: {message}")]
    Timeout {
        /// Details.
        message: String,
    },

    /// A dependency failed with a transient error.
    #[error("service unavailable: {message}")]
    ServiceUnavailable {
        /// Details.
        message: String,
    },

    /// A broadcast transaction was not seen in a block before the deadline.
    /// It may still be included; resubmitting risks a second order.
    #[error("transaction {tx_hash} not confirmed within {timeout:?}")]
    Unconfirmed {
        /// Hash of the broadcast transaction.
        tx_hash: String,
        /// Confirmation deadline used.
        timeout: Duration,
    },

    /// Ledger failure.
    #[error("database error: {message}")]
    Ledger {
        /// Details.
        message: String,
    },

    /// Signer failure.
    #[error("wallet error: {message}")]
    Wallet {
        /// Details.
        message: String,
    },

    /// The transaction was rejected or failed.
    #[error("transaction failed: {message}")]
    TransactionFailed {
        /// Details.
        message: String,
    },
}

impl RouterError {
    /// Stable code for the transport layer.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::InvalidMarket { .. } => ErrorCode::InvalidMarket,
            Self::InvalidOrderState { .. } => ErrorCode::InvalidOrderState,
            Self::OrderNotFound { .. } => ErrorCode::OrderNotFound,
            Self::PositionNotFound { .. } => ErrorCode::PositionNotFound,
            Self::CircuitOpen { .. } => ErrorCode::CircuitBreakerOpen,
            Self::Timeout { .. } | Self::Unconfirmed { .. } => ErrorCode::Timeout,
            Self::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            Self::Ledger { .. } => ErrorCode::DatabaseError,
            Self::Wallet { .. } => ErrorCode::WalletError,
            Self::TransactionFailed { .. } => ErrorCode::TransactionFailed,
        }
    }

    /// Returns true if the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen { .. } | Self::Timeout { .. } | Self::ServiceUnavailable { .. }
        )
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    fn from_resilience<E: std::fmt::Display>(
        error: ResilienceError<E>,
        operation: impl FnOnce(E) -> Self,
    ) -> Self {
        match error {
            ResilienceError::CircuitOpen { name } => Self::CircuitOpen { name },
            ResilienceError::Timeout { name, timeout } => Self::Timeout {
                message: format!("{name} call exceeded {timeout:?}"),
            },
            e @ ResilienceError::RetriesExhausted { .. } => Self::ServiceUnavailable {
                message: e.to_string(),
            },
            ResilienceError::Cancelled => Self::ServiceUnavailable {
                message: "operation cancelled".to_string(),
            },
            ResilienceError::Operation(e) => operation(e),
        }
    }
}

impl From<OrderError> for RouterError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::Validation { field, message } => Self::Validation { field, message },
            OrderError::Duplicate { client_id } => {
                Self::validation("client_id", format!("duplicate client id: {client_id}"))
            }
            OrderError::NotFound { id } => Self::OrderNotFound { id },
            OrderError::InvalidState {
                order_id,
                status,
                operation,
            } => Self::InvalidOrderState {
                order_id,
                status,
                operation,
            },
            e @ (OrderError::InvariantViolation { .. }
            | OrderError::ConcurrentModification { .. }
            | OrderError::Storage { .. }) => Self::Ledger {
                message: e.to_string(),
            },
        }
    }
}

impl From<MarketError> for RouterError {
    fn from(error: MarketError) -> Self {
        match error {
            MarketError::NotFound { market } => Self::InvalidMarket { market },
            e @ MarketError::Fetch { .. } => Self::ServiceUnavailable {
                message: e.to_string(),
            },
        }
    }
}

impl From<SignerError> for RouterError {
    fn from(error: SignerError) -> Self {
        Self::Wallet {
            message: error.to_string(),
        }
    }
}

impl From<ResilienceError<ChainError>> for RouterError {
    fn from(error: ResilienceError<ChainError>) -> Self {
        Self::from_resilience(error, |e| match e {
            ChainError::ConfirmationTimeout { tx_hash, timeout } => {
                Self::Unconfirmed { tx_hash, timeout }
            }
            ChainError::Broadcast { .. } => Self::TransactionFailed {
                message: e.to_string(),
            },
            ChainError::Rpc { .. } | ChainError::Status { .. } | ChainError::Cancelled => {
                Self::ServiceUnavailable {
                    message: e.to_string(),
                }
            }
        })
    }
}

impl From<ResilienceError<IndexerError>> for RouterError {
    fn from(error: ResilienceError<IndexerError>) -> Self {
        Self::from_resilience(error, |e| Self::ServiceUnavailable {
            message: e.to_string(),
        })
    }
}

impl From<TxError> for RouterError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::Market(e) => e.into(),
            TxError::Quantization(e) => Self::validation("size", e.to_string()),
            TxError::Order(e) => e.into(),
            TxError::InvalidOrderState {
                order_id,
                status,
                operation,
            } => Self::InvalidOrderState {
                order_id,
                status,
                operation,
            },
            TxError::Signer(e) => e.into(),
            TxError::Chain(e) => e.into(),
            e @ (TxError::Encode { .. } | TxError::TransactionFailed { .. }) => {
                Self::TransactionFailed {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl From<ServiceError> for RouterError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Indexer(e) => e.into(),
            ServiceError::Ledger(e) => e.into(),
            e @ ServiceError::AlreadyRunning { .. } => Self::ServiceUnavailable {
                message: e.to_string(),
            },
        }
    }
}
