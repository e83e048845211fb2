//! Remote signing service client.
//!
//! `GET {url}/address` returns `{"address": "..."}`; `POST {url}/sign` with
//! `{"payload": "<base64>"}` returns `{"signature": "<base64>"}`. The address
//! is cached after the first successful lookup.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::application::ports::{SignerError, SignerPort};

#[derive(Deserialize)]
struct AddressBody {
    address: String,
}

#[derive(Serialize)]
struct SignRequest {
    payload: String,
}

#[derive(Deserialize)]
struct SignBody {
    signature: String,
}

/// HTTP signer adapter.
#[derive(Debug)]
pub struct RemoteSigner {
    client: Client,
    base_url: String,
    address: OnceCell<String>,
}

impl RemoteSigner {
    /// Create a client for the signing service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SignerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignerError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            address: OnceCell::new(),
        })
    }

    async fn check(response: Response) -> Result<Response, SignerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("signer returned status {}: {body}", status.as_u16());
        if status.is_server_error() {
            Err(SignerError::Unavailable { message })
        } else {
            Err(SignerError::SigningFailed { message })
        }
    }

    async fn fetch_address(&self) -> Result<String, SignerError> {
        let response = self
            .client
            .get(format!("{}/address", self.base_url))
            .send()
            .await
            .map_err(|e| SignerError::Unavailable {
                message: e.to_string(),
            })?;
        let body: AddressBody = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SignerError::SigningFailed {
                message: format!("invalid address response: {e}"),
            })?;
        if body.address.is_empty() {
            return Err(SignerError::SigningFailed {
                message: "signer returned an empty address".to_string(),
            });
        }
        tracing::info!(address = %body.address, "Signer address resolved");
        Ok(body.address)
    }
}

#[async_trait]
impl SignerPort for RemoteSigner {
    async fn address(&self) -> Result<String, SignerError> {
        self.address
            .get_or_try_init(|| self.fetch_address())
            .await
            .cloned()
    }

    async fn sign_bytes(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError> {
        let response = self
            .client
            .post(format!("{}/sign", self.base_url))
            .json(&SignRequest {
                payload: BASE64.encode(payload),
            })
            .send()
            .await
            .map_err(|e| SignerError::Unavailable {
                message: e.to_string(),
            })?;
        let body: SignBody = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SignerError::SigningFailed {
                message: format!("invalid sign response: {e}"),
            })?;
        BASE64
            .decode(body.signature)
            .map_err(|e| SignerError::SigningFailed {
                message: format!("signature is not base64: {e}"),
            })
    }
}
