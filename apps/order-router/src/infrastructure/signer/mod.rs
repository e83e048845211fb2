//! Signer Adapters
//!
//! HTTP client for an external signing service that holds the wallet key.

mod remote;

pub use remote::RemoteSigner;
