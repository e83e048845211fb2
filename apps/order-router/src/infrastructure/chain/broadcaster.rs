//! JSON-RPC transaction broadcaster.
//!
//! Submits signed transactions with `broadcast_tx_sync` and polls `tx` until
//! the transaction is included or the confirmation timeout elapses.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ChainError, ChainPort, TxResponse};
use crate::resilience::Retryable;

/// Default confirmation timeout.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between confirmation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BROADCAST_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Uppercase hex SHA-256 of the transaction bytes.
#[must_use]
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Serialize)]
struct BroadcastParams {
    tx: String,
}

#[derive(Serialize)]
struct TxQueryParams {
    hash: String,
    prove: bool,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

impl RpcErrorBody {
    fn is_not_found(&self) -> bool {
        self.data
            .as_deref()
            .is_some_and(|d| d.contains("not found"))
            || self.message.contains("not found")
    }
}

#[derive(Deserialize)]
struct BroadcastResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
}

#[derive(Deserialize)]
struct TxQueryResult {
    #[serde(default)]
    height: String,
    tx_result: ExecResult,
}

#[derive(Deserialize)]
struct ExecResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    gas_wanted: String,
    #[serde(default)]
    gas_used: String,
}

enum Poll {
    Included(TxResponse),
    Pending,
}

/// Chain RPC adapter.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    client: Client,
    rpc_url: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl Broadcaster {
    /// Create a broadcaster for `rpc_url` with the given confirmation timeout.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Rpc {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set the interval between confirmation polls.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Poll interval updated");
    }

    /// Set the confirmation timeout used by `broadcast_and_wait`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Confirmation timeout updated");
    }

    /// Configured confirmation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Broadcast with this adapter's own backoff (1s, doubling), for transient
    /// transport failures before the node has seen the transaction.
    ///
    /// Makes up to `max_retries + 1` attempts. Non-retryable errors and
    /// cancellation return immediately.
    pub async fn retry_broadcast(
        &self,
        tx_bytes: &[u8],
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<String, ChainError> {
        let mut backoff = RETRY_BROADCAST_INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }
            match self.broadcast_tx(tx_bytes).await {
                Ok(hash) => return Ok(hash),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries,
                        delay_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Broadcast attempt failed, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ChainError::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    tracing::error!(attempts = attempt + 1, error = %e, "All broadcast attempts failed");
                    return Err(e);
                }
            }
        }
    }

    async fn call<P: Serialize + Send, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<RpcResponse<T>, ChainError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Rpc {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ChainError::Rpc {
            message: e.to_string(),
        })?;
        if !status.is_success() {
            // CometBFT answers JSON-RPC errors with 500 and a JSON body.
            if let Ok(parsed) = serde_json::from_str::<RpcResponse<T>>(&body) {
                if parsed.error.is_some() {
                    return Ok(parsed);
                }
            }
            return Err(ChainError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ChainError::Rpc {
            message: format!("invalid {method} response: {e}"),
        })
    }

    async fn query_tx(&self, hash: &str) -> Result<Poll, ChainError> {
        let raw = hex::decode(hash).map_err(|e| ChainError::Rpc {
            message: format!("invalid tx hash {hash}: {e}"),
        })?;
        let response: RpcResponse<TxQueryResult> = self
            .call(
                "tx",
                TxQueryParams {
                    hash: BASE64.encode(raw),
                    prove: false,
                },
            )
            .await?;

        match (response.result, response.error) {
            (Some(result), _) => Ok(Poll::Included(TxResponse {
                tx_hash: hash.to_string(),
                code: result.tx_result.code,
                raw_log: result.tx_result.log,
                gas_used: result.tx_result.gas_used.parse().unwrap_or_default(),
                gas_wanted: result.tx_result.gas_wanted.parse().unwrap_or_default(),
                height: result.height.parse().unwrap_or_default(),
                timestamp: Utc::now(),
            })),
            (None, Some(error)) if error.is_not_found() => Ok(Poll::Pending),
            (None, Some(error)) => Err(ChainError::Rpc {
                message: format!("tx query failed ({}): {}", error.code, error.message),
            }),
            (None, None) => Ok(Poll::Pending),
        }
    }
}

#[async_trait]
impl ChainPort for Broadcaster {
    async fn broadcast_tx(&self, tx_bytes: &[u8]) -> Result<String, ChainError> {
        let hash = tx_hash(tx_bytes);
        tracing::debug!(tx_hash = %hash, bytes = tx_bytes.len(), "Broadcasting transaction");

        let response: RpcResponse<BroadcastResult> = self
            .call(
                "broadcast_tx_sync",
                BroadcastParams {
                    tx: BASE64.encode(tx_bytes),
                },
            )
            .await?;

        match (response.result, response.error) {
            (Some(result), _) if result.code == 0 => {
                tracing::info!(tx_hash = %hash, "Transaction broadcast");
                Ok(hash)
            }
            (Some(result), _) => Err(ChainError::Broadcast {
                code: result.code,
                log: result.log,
            }),
            (None, Some(error)) => Err(ChainError::Rpc {
                message: format!(
                    "{} ({}){}",
                    error.message,
                    error.code,
                    error.data.map(|d| format!(": {d}")).unwrap_or_default()
                ),
            }),
            (None, None) => Err(ChainError::Rpc {
                message: "empty broadcast_tx_sync response".to_string(),
            }),
        }
    }

    async fn poll_confirmation(
        &self,
        tx_hash: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, ChainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.poll_interval, self.poll_interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(ChainError::Cancelled),
                () = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(tx_hash, timeout_ms = timeout.as_millis() as u64, "Transaction confirmation timeout");
                    return Err(ChainError::ConfirmationTimeout {
                        tx_hash: tx_hash.to_string(),
                        timeout,
                    });
                }
                _ = ticker.tick() => match self.query_tx(tx_hash).await {
                    Ok(Poll::Included(response)) => {
                        tracing::info!(tx_hash, height = response.height, code = response.code, "Transaction confirmed");
                        return Ok(response);
                    }
                    Ok(Poll::Pending) => tracing::debug!(tx_hash, "Transaction not yet included"),
                    Err(e) => tracing::debug!(tx_hash, error = %e, "Confirmation poll failed"),
                },
            }
        }
    }

    async fn broadcast_and_wait(
        &self,
        tx_bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<TxResponse, ChainError> {
        let hash = self.broadcast_tx(tx_bytes).await?;
        self.poll_confirmation(&hash, self.timeout, cancel).await
    }
}
