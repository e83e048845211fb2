//! Protocol messages for placing and cancelling orders.
//!
//! Messages carry only protocol integers; conversion from human values is
//! done beforehand by the quantizer.

use serde::{Deserialize, Serialize};

use super::client_id::protocol_client_id;
use super::metadata::MarketMetadata;
use crate::domain::order::{OrderSide, TimeInForce};

/// Good-til-block used when the caller gives no expiry.
pub const DEFAULT_GOOD_TIL_BLOCK: u32 = 100;

/// Short-term order flag.
pub const ORDER_FLAGS_SHORT_TERM: u32 = 0;

/// Place-order message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgPlaceOrder {
    /// Signer address.
    pub sender: String,
    /// Subaccount number.
    pub subaccount_number: u32,
    /// Market ticker.
    pub market: String,
    /// CLOB pair id.
    pub clob_pair_id: u32,
    /// Side.
    pub side: OrderSide,
    /// Size in quantums.
    pub quantums: u64,
    /// Price in subticks.
    pub subticks: u64,
    /// Last block the order is valid in.
    pub good_til_block: u32,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Protocol client id.
    pub client_id: u32,
    /// Only reduce an existing position.
    pub reduce_only: bool,
    /// Order flags.
    pub order_flags: u32,
}

/// Cancel-order message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCancelOrder {
    /// Signer address.
    pub sender: String,
    /// Subaccount number.
    pub subaccount_number: u32,
    /// Market ticker.
    pub market: String,
    /// CLOB pair id.
    pub clob_pair_id: u32,
    /// Protocol client id of the order to cancel.
    pub client_id: u32,
    /// Last block the cancel is valid in.
    pub good_til_block: u32,
}

/// Any message carried in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ProtocolMessage {
    /// Place an order.
    PlaceOrder(MsgPlaceOrder),
    /// Cancel an order.
    CancelOrder(MsgCancelOrder),
}

/// Quantized inputs for a place-order message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceOrderFields {
    /// Side.
    pub side: OrderSide,
    /// Size in quantums.
    pub quantums: u64,
    /// Price in subticks.
    pub subticks: u64,
    /// Last valid block; `None` uses the default.
    pub good_til_block: Option<u32>,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Full client order id.
    pub client_order_id: u64,
    /// Reduce-only flag.
    pub reduce_only: bool,
}

/// Build a place-order message for `market`.
#[must_use]
pub fn build_place_order_msg(
    sender: &str,
    market: &MarketMetadata,
    fields: PlaceOrderFields,
) -> MsgPlaceOrder {
    let msg = MsgPlaceOrder {
        sender: sender.to_string(),
        subaccount_number: 0,
        market: market.pair.clone(),
        clob_pair_id: market.id,
        side: fields.side,
        quantums: fields.quantums,
        subticks: fields.subticks,
        good_til_block: fields
            .good_til_block
            .unwrap_or(DEFAULT_GOOD_TIL_BLOCK),
        time_in_force: fields.time_in_force,
        client_id: protocol_client_id(fields.client_order_id),
        reduce_only: fields.reduce_only,
        order_flags: ORDER_FLAGS_SHORT_TERM,
    };

    tracing::debug!(
        market = %msg.market,
        side = %msg.side,
        quantums = msg.quantums,
        subticks = msg.subticks,
        client_id = msg.client_id,
        "Built place order message"
    );
    msg
}

/// Build a cancel-order message.
#[must_use]
pub fn build_cancel_order_msg(
    sender: &str,
    market: &MarketMetadata,
    client_order_id: u64,
    good_til_block: Option<u32>,
) -> MsgCancelOrder {
    MsgCancelOrder {
        sender: sender.to_string(),
        subaccount_number: 0,
        market: market.pair.clone(),
        clob_pair_id: market.id,
        client_id: protocol_client_id(client_order_id),
        good_til_block: good_til_block.unwrap_or(DEFAULT_GOOD_TIL_BLOCK),
    }
}
