//! Signer Port (Driven Port)
//!
//! Opaque signing capability. Key material never crosses this boundary.

use async_trait::async_trait;

use crate::resilience::{Retryable, is_temporary_error_message};

/// Signer port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The signer could not be reached.
    #[error("signer unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The signer refused or failed to sign.
    #[error("signing failed: {message}")]
    SigningFailed {
        /// Error details.
        message: String,
    },
}

impl Retryable for SignerError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { message } => is_temporary_error_message(message),
            Self::SigningFailed { .. } => false,
        }
    }
}

/// Port for the wallet signer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignerPort: Send + Sync {
    /// Address of the signing account.
    async fn address(&self) -> Result<String, SignerError>;

    /// Sign an arbitrary payload, returning the raw signature.
    async fn sign_bytes(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError>;
}
