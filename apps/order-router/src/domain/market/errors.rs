//! Market and quantization errors.

use thiserror::Error;

/// Errors converting human-readable order parameters to protocol integers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantizationError {
    /// Size or price was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositive {
        /// "size" or "price".
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// Value quantizes to zero protocol units.
    #[error("{field} {value} is below the market resolution")]
    BelowResolution {
        /// "size" or "price".
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// Value does not fit the protocol integer.
    #[error("{field} {value} overflows the protocol range")]
    Overflow {
        /// "size" or "price".
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// Quantums are not a multiple of the market step.
    #[error("invalid quantization: quantums {quantums} is not a multiple of step {step_base_quantums}")]
    InvalidQuantization {
        /// Quantized size.
        quantums: u64,
        /// Market step in base quantums.
        step_base_quantums: u64,
    },
}

/// Errors resolving market metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Unknown market. Permanent; never retried.
    #[error("market not found: {market}")]
    NotFound {
        /// Requested market ticker.
        market: String,
    },

    /// Metadata could not be fetched.
    #[error("failed to fetch market metadata: {message}")]
    Fetch {
        /// Underlying error.
        message: String,
    },
}
