//! Market Domain
//!
//! Per-market quantization parameters, the quantizer that turns human
//! order parameters into protocol integers, client order ids, and the
//! protocol messages built from them.

pub mod client_id;
pub mod errors;
pub mod messages;
pub mod metadata;
pub mod quantizer;

pub use client_id::{client_order_id_for, generate_client_order_id, protocol_client_id};
pub use errors::{MarketError, QuantizationError};
pub use messages::{
    DEFAULT_GOOD_TIL_BLOCK, MsgCancelOrder, MsgPlaceOrder, PlaceOrderFields,
    ProtocolMessage, build_cancel_order_msg, build_place_order_msg,
};
pub use metadata::{
    DEFAULT_QUANTUM_CONVERSION_EXPONENT, MarketMetadata, QUOTE_ATOMIC_RESOLUTION, fallback_markets,
};
pub use quantizer::{dequantize_size, quantize_price, quantize_size, validate_quantization};
