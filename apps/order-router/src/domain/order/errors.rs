//! Order ledger errors.

use thiserror::Error;

use super::value_objects::OrderStatus;
use crate::resilience::{Retryable, is_temporary_error_message};

/// Errors raised by the order model and the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Invalid order parameters.
    #[error("validation error on '{field}': {message}")]
    Validation {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// Order not found.
    #[error("order not found: {id}")]
    NotFound {
        /// Identifier used for the lookup.
        id: String,
    },

    /// Operation not allowed in the order's current status.
    #[error("cannot {operation} order {order_id} in status {status}")]
    InvalidState {
        /// Internal order id.
        order_id: String,
        /// Current status.
        status: OrderStatus,
        /// Attempted operation.
        operation: &'static str,
    },

    /// `filled_size + remaining_size == size` (or non-negativity) violated.
    #[error("order {order_id} invariant violated: {message}")]
    InvariantViolation {
        /// Internal order id.
        order_id: String,
        /// Description of the violation.
        message: String,
    },

    /// The stored row changed since it was read.
    #[error("order {order_id} was modified concurrently (expected version {expected})")]
    ConcurrentModification {
        /// Internal order id.
        order_id: String,
        /// Version the caller read.
        expected: u64,
    },

    /// An order with the same client id already exists.
    #[error("duplicate client id: {client_id}")]
    Duplicate {
        /// Client order id.
        client_id: String,
    },

    /// Storage backend failure.
    #[error("storage error: {message}")]
    Storage {
        /// Backend error message.
        message: String,
    },
}

impl OrderError {
    /// Shorthand for a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a storage error.
    pub fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }
}

impl Retryable for OrderError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { message } => {
                let lower = message.to_lowercase();
                lower.contains("locked") || lower.contains("busy") || is_temporary_error_message(&lower)
            }
            _ => false,
        }
    }
}
