//! Transaction Pipeline
//!
//! Turns a persisted `PENDING` order into a signed, broadcast transaction:
//!
//! ```text
//! market cache → quantize → client id → sender → message → sign → broadcast
//! ```
//!
//! Every step before the broadcast is local or signer-only, so a failure
//! there never reaches the chain. The ledger row is updated with the outcome
//! either way.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ledger::update_with_retry;
use super::market_cache::MarketCache;
use crate::application::ports::{ChainError, ChainPort, SignerError, SignerPort, TxResponse};
use crate::domain::market::{
    MarketError, MarketMetadata, PlaceOrderFields, ProtocolMessage, QuantizationError,
    build_cancel_order_msg, build_place_order_msg, client_order_id_for, quantize_price,
    quantize_size, validate_quantization,
};
use crate::domain::order::{Order, OrderError, OrderRepository, OrderSide, OrderStatus, TimeInForce};
use crate::observability;
use crate::resilience::{ResilienceError, ResilientExecutor};

/// Slippage bound applied to the oracle price for market-family orders.
pub const MARKET_ORDER_SLIPPAGE: Decimal = dec!(0.05);

/// Gas and chain settings for built transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxBuilderConfig {
    /// Chain id signed into every transaction.
    pub chain_id: String,
    /// Base gas limit.
    pub gas_limit: u64,
    /// Gas price with denomination, e.g. `0.025udydx`.
    pub gas_price: String,
    /// Multiplier applied to the gas limit.
    pub gas_adjustment: f64,
    /// Blocks an order stays valid when the caller gives no expiry.
    pub good_til_block_offset: u32,
    /// Transaction memo.
    pub memo: String,
}

impl Default for TxBuilderConfig {
    fn default() -> Self {
        Self {
            chain_id: "dydx-mainnet-1".to_string(),
            gas_limit: 200_000,
            gas_price: "0.025udydx".to_string(),
            gas_adjustment: 1.5,
            good_til_block_offset: 100,
            memo: String::new(),
        }
    }
}

/// Transaction fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Fee amount in `denom`.
    pub amount: Decimal,
    /// Fee denomination.
    pub denom: String,
    /// Adjusted gas limit.
    pub gas_limit: u64,
}

/// Split `0.025udydx` into amount and denomination.
#[must_use]
pub fn parse_gas_price(gas_price: &str) -> Option<(Decimal, String)> {
    let split = gas_price.find(|c: char| c.is_ascii_alphabetic())?;
    let (amount, denom) = gas_price.split_at(split);
    let amount: Decimal = amount.trim().parse().ok()?;
    (amount >= Decimal::ZERO).then(|| (amount, denom.to_string()))
}

impl Fee {
    /// Compute the fee for `config`.
    pub fn from_config(config: &TxBuilderConfig) -> Result<Self, TxError> {
        let (price, denom) = parse_gas_price(&config.gas_price).ok_or_else(|| TxError::Encode {
            message: format!("invalid gas price '{}'", config.gas_price),
        })?;
        let adjustment = Decimal::from_f64(config.gas_adjustment).ok_or_else(|| TxError::Encode {
            message: format!("invalid gas adjustment {}", config.gas_adjustment),
        })?;
        let gas_limit = (Decimal::from(config.gas_limit) * adjustment).ceil();
        let gas_limit = u64::try_from(gas_limit).map_err(|e| TxError::Encode {
            message: format!("gas limit out of range: {e}"),
        })?;

        Ok(Self {
            amount: (Decimal::from(gas_limit) * price).ceil(),
            denom,
            gas_limit,
        })
    }
}

/// Transaction as signed and broadcast.
///
/// The signature covers the JSON encoding of the envelope with `signature`
/// unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEnvelope {
    /// Chain id.
    pub chain_id: String,
    /// Signer address.
    pub sender: String,
    /// Carried messages.
    pub messages: Vec<ProtocolMessage>,
    /// Gas limit.
    pub gas_limit: u64,
    /// Fee.
    pub fee: Fee,
    /// Memo.
    pub memo: String,
    /// Base64 signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Transaction pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// Market metadata lookup failed.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Size or price could not be quantized.
    #[error(transparent)]
    Quantization(#[from] QuantizationError),

    /// Ledger read/write or order validation failed.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Operation not allowed in the order's status. No network call was made.
    #[error("cannot {operation} order {order_id} in status {status}")]
    InvalidOrderState {
        /// Internal order id.
        order_id: String,
        /// Current status.
        status: OrderStatus,
        /// Attempted operation.
        operation: &'static str,
    },

    /// The signer failed.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Transaction encoding failed.
    #[error("failed to encode transaction: {message}")]
    Encode {
        /// Error details.
        message: String,
    },

    /// Broadcast or confirmation failed under the resilience layer.
    #[error(transparent)]
    Chain(#[from] ResilienceError<ChainError>),

    /// The transaction was included but failed to execute.
    #[error("transaction {tx_hash} failed with code {code}: {log}")]
    TransactionFailed {
        /// Transaction hash.
        tx_hash: String,
        /// ABCI code.
        code: u32,
        /// Execution log.
        log: String,
    },
}

/// Result of quantizing an order for the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quantized {
    quantums: u64,
    subticks: u64,
    time_in_force: TimeInForce,
}

/// Orchestrates the place and cancel pipelines.
pub struct TxBuilder {
    markets: Arc<MarketCache>,
    signer: Arc<dyn SignerPort>,
    chain: Arc<dyn ChainPort>,
    repository: Arc<dyn OrderRepository>,
    executor: ResilientExecutor,
    config: TxBuilderConfig,
    fee: Fee,
}

impl std::fmt::Debug for TxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxBuilder")
            .field("config", &self.config)
            .field("fee", &self.fee)
            .finish_non_exhaustive()
    }
}

impl TxBuilder {
    /// Create a pipeline; fails if the gas settings cannot be parsed.
    pub fn new(
        markets: Arc<MarketCache>,
        signer: Arc<dyn SignerPort>,
        chain: Arc<dyn ChainPort>,
        repository: Arc<dyn OrderRepository>,
        executor: ResilientExecutor,
        config: TxBuilderConfig,
    ) -> Result<Self, TxError> {
        let fee = Fee::from_config(&config)?;
        Ok(Self {
            markets,
            signer,
            chain,
            repository,
            executor,
            config,
            fee,
        })
    }

    /// Place a `PENDING` order already persisted by the caller.
    ///
    /// On success the order is `OPEN` with its transaction hash and height;
    /// on failure it is `REJECTED` with the error recorded.
    pub async fn place_order(
        &self,
        order: &mut Order,
        reduce_only: bool,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, TxError> {
        if order.status != OrderStatus::Pending {
            return Err(TxError::InvalidOrderState {
                order_id: order.id.to_string(),
                status: order.status,
                operation: "place",
            });
        }

        let (tx_bytes, quantized) = match self.prepare_place(order, reduce_only, cancel).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.reject(order, &e, 0).await;
                return Err(e);
            }
        };

        let outcome = self
            .executor
            .execute(cancel, || self.chain.broadcast_and_wait(&tx_bytes, cancel))
            .await;

        let response = match outcome {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let e = TxError::TransactionFailed {
                    tx_hash: response.tx_hash,
                    code: response.code,
                    log: response.raw_log,
                };
                self.reject(order, &e, 0).await;
                return Err(e);
            }
            Err(ResilienceError::Operation(ChainError::ConfirmationTimeout { tx_hash, timeout })) => {
                self.await_inclusion(order, &tx_hash, quantized).await;
                return Err(TxError::Chain(ResilienceError::Operation(
                    ChainError::ConfirmationTimeout { tx_hash, timeout },
                )));
            }
            Err(e) => {
                let retries = match &e {
                    ResilienceError::RetriesExhausted { attempts, .. } => attempts.saturating_sub(1),
                    _ => 0,
                };
                let e = TxError::Chain(e);
                self.reject(order, &e, retries).await;
                return Err(e);
            }
        };

        update_with_retry(
            self.repository.as_ref(),
            order,
            Some("transaction confirmed".to_string()),
            |o| {
                o.quantums = Some(quantized.quantums);
                o.subticks = Some(quantized.subticks);
                o.gas_used = Some(response.gas_used);
                o.gas_fee = Some(self.fee.amount);
                if o.status == OrderStatus::Pending {
                    o.mark_placed(response.tx_hash.clone(), Some(response.height));
                }
                Ok(())
            },
        )
        .await?;

        observability::record_order_placement(&order.market, "placed");
        tracing::info!(
            order_id = %order.id,
            market = %order.market,
            tx_hash = %response.tx_hash,
            height = response.height,
            quantums = quantized.quantums,
            subticks = quantized.subticks,
            "Order placed"
        );
        Ok(response)
    }

    /// Cancel an `OPEN` or `PARTIALLY_FILLED` order.
    ///
    /// Other statuses fail with [`TxError::InvalidOrderState`] before any
    /// network call. A failed cancel leaves the order untouched.
    pub async fn cancel_order(
        &self,
        order: &mut Order,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, TxError> {
        if !order.status.is_cancellable() {
            return Err(TxError::InvalidOrderState {
                order_id: order.id.to_string(),
                status: order.status,
                operation: "cancel",
            });
        }

        let market = self.markets.get_market(&order.market, cancel).await?;
        let sender = self.signer.address().await?;
        let msg = build_cancel_order_msg(
            &sender,
            &market,
            client_order_id_for(&order.client_id),
            Some(self.good_til_block(order)),
        );
        let tx_bytes = self
            .sign(sender, ProtocolMessage::CancelOrder(msg))
            .await?;

        let response = self
            .executor
            .execute(cancel, || self.chain.broadcast_and_wait(&tx_bytes, cancel))
            .await?;
        if !response.is_success() {
            return Err(TxError::TransactionFailed {
                tx_hash: response.tx_hash,
                code: response.code,
                log: response.raw_log,
            });
        }

        update_with_retry(
            self.repository.as_ref(),
            order,
            Some("cancelled by user".to_string()),
            |o| {
                // A fill seen by sync in the meantime wins over the cancel.
                if o.status.is_cancellable() {
                    o.mark_cancelled(response.tx_hash.clone());
                }
                Ok(())
            },
        )
        .await?;

        observability::record_order_placement(&order.market, "cancelled");
        tracing::info!(
            order_id = %order.id,
            tx_hash = %response.tx_hash,
            status = %order.status,
            "Order cancelled"
        );
        Ok(response)
    }

    async fn prepare_place(
        &self,
        order: &Order,
        reduce_only: bool,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Quantized), TxError> {
        let market = self.markets.get_market(&order.market, cancel).await?;
        let quantized = quantize_order(order, &market)?;
        let client_order_id = client_order_id_for(&order.client_id);
        let sender = self.signer.address().await?;

        let msg = build_place_order_msg(
            &sender,
            &market,
            PlaceOrderFields {
                side: order.side,
                quantums: quantized.quantums,
                subticks: quantized.subticks,
                good_til_block: Some(self.good_til_block(order)),
                time_in_force: quantized.time_in_force,
                client_order_id,
                reduce_only,
            },
        );
        let tx_bytes = self.sign(sender, ProtocolMessage::PlaceOrder(msg)).await?;
        Ok((tx_bytes, quantized))
    }

    async fn sign(&self, sender: String, message: ProtocolMessage) -> Result<Vec<u8>, TxError> {
        let mut envelope = TxEnvelope {
            chain_id: self.config.chain_id.clone(),
            sender,
            messages: vec![message],
            gas_limit: self.fee.gas_limit,
            fee: self.fee.clone(),
            memo: self.config.memo.clone(),
            signature: None,
        };
        let sign_doc = serde_json::to_vec(&envelope).map_err(|e| TxError::Encode {
            message: e.to_string(),
        })?;
        let signature = self.signer.sign_bytes(&sign_doc).await?;
        envelope.signature = Some(BASE64.encode(signature));

        serde_json::to_vec(&envelope).map_err(|e| TxError::Encode {
            message: e.to_string(),
        })
    }

    fn good_til_block(&self, order: &Order) -> u32 {
        order
            .good_til_block
            .unwrap_or(self.config.good_til_block_offset)
    }

    /// The transaction was accepted but not seen in a block in time. It may
    /// still be included, so the order stays `PENDING` with its hash for
    /// sync and reconciliation to settle.
    async fn await_inclusion(&self, order: &mut Order, tx_hash: &str, quantized: Quantized) {
        let note = format!("transaction {tx_hash} broadcast but not yet confirmed");
        let result = update_with_retry(self.repository.as_ref(), order, None, |o| {
            if o.status == OrderStatus::Pending {
                o.quantums = Some(quantized.quantums);
                o.subticks = Some(quantized.subticks);
                o.tx_hash = Some(tx_hash.to_string());
                o.error_message = Some(note.clone());
            }
            Ok(())
        })
        .await;

        observability::record_order_placement(&order.market, "unconfirmed");
        match result {
            Ok(()) => tracing::warn!(
                order_id = %order.id,
                tx_hash,
                "Order transaction unconfirmed, left pending"
            ),
            Err(e) => tracing::error!(
                order_id = %order.id,
                tx_hash,
                error = %e,
                "Failed to record unconfirmed transaction"
            ),
        }
    }

    async fn reject(&self, order: &mut Order, error: &TxError, retries: u32) {
        let message = error.to_string();
        let result = update_with_retry(
            self.repository.as_ref(),
            order,
            Some(message.clone()),
            |o| {
                if o.status == OrderStatus::Pending {
                    o.retry_count = retries;
                    o.mark_rejected(message.clone());
                }
                Ok(())
            },
        )
        .await;

        observability::record_order_placement(&order.market, "rejected");
        match result {
            Ok(()) => tracing::warn!(
                order_id = %order.id,
                market = %order.market,
                error = %message,
                "Order rejected"
            ),
            Err(e) => tracing::error!(
                order_id = %order.id,
                error = %message,
                ledger_error = %e,
                "Failed to record order rejection"
            ),
        }
    }
}

/// Price sent to the protocol for `order`.
///
/// Market-family orders carry no price; they are bounded by the oracle price
/// plus or minus the slippage allowance.
pub fn protocol_price(order: &Order, market: &MarketMetadata) -> Result<Decimal, OrderError> {
    if let Some(price) = order.price {
        return Ok(price);
    }
    if !order.order_type.is_market() {
        return Err(OrderError::validation(
            "price",
            format!("price is required for {} orders", order.order_type),
        ));
    }
    let oracle = market.oracle_price.ok_or_else(|| {
        OrderError::validation(
            "price",
            format!("no oracle price known for {}", market.pair),
        )
    })?;
    Ok(match order.side {
        OrderSide::Buy => oracle * (Decimal::ONE + MARKET_ORDER_SLIPPAGE),
        OrderSide::Sell => oracle * (Decimal::ONE - MARKET_ORDER_SLIPPAGE),
    })
}

fn quantize_order(order: &Order, market: &MarketMetadata) -> Result<Quantized, TxError> {
    let price = protocol_price(order, market)?;
    let quantums = quantize_size(order.size, market.atomic_resolution)?;
    let mut subticks = quantize_price(price, market.subticks_exponent())?;
    let time_in_force = if order.order_type.is_market() {
        // Protection prices are rounded to a whole tick away from the oracle.
        let per_tick = u64::from(market.subticks_per_tick.max(1));
        subticks = match order.side {
            OrderSide::Buy => subticks.div_ceil(per_tick) * per_tick,
            OrderSide::Sell => (subticks / per_tick).max(1) * per_tick,
        };
        TimeInForce::Ioc
    } else {
        order.time_in_force
    };
    validate_quantization(quantums, subticks, market.step_base_quantums)?;
    Ok(Quantized {
        quantums,
        subticks,
        time_in_force,
    })
}
