//! Domain layer - order ledger model, market quantization and
//! reconciliation findings. No I/O.

pub mod market;
pub mod order;
pub mod reconciliation;
