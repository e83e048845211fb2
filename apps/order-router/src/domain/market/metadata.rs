//! Per-market quantization parameters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Atomic resolution of the quote asset (USDC).
pub const QUOTE_ATOMIC_RESOLUTION: i32 = -6;

/// Quantum conversion exponent used when the indexer does not provide one.
pub const DEFAULT_QUANTUM_CONVERSION_EXPONENT: i32 = -9;

/// Quantization configuration for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMetadata {
    /// CLOB pair id.
    pub id: u32,
    /// Market ticker (e.g., "BTC-USD").
    pub pair: String,
    /// Size exponent: one quantum is `10^atomic_resolution` base units.
    pub atomic_resolution: i32,
    /// Price conversion exponent.
    pub quantum_conversion_exponent: i32,
    /// Subticks per price tick.
    pub subticks_per_tick: u32,
    /// Minimum order size increment in quantums.
    pub step_base_quantums: u64,
    /// Minimum price increment in quote units.
    pub min_price_change: Decimal,
    /// Minimum size increment in base units.
    pub step_size: Decimal,
    /// Last oracle price, when known.
    pub oracle_price: Option<Decimal>,
    /// When this entry was fetched.
    pub cache_time: DateTime<Utc>,
}

impl MarketMetadata {
    /// Exponent applied to a human price to obtain subticks.
    #[must_use]
    pub const fn subticks_exponent(&self) -> i32 {
        self.atomic_resolution - self.quantum_conversion_exponent - QUOTE_ATOMIC_RESOLUTION
    }
}

/// Static metadata for the main markets, used when the indexer is unreachable.
#[must_use]
pub fn fallback_markets() -> HashMap<String, MarketMetadata> {
    let now = Utc::now();
    // (id, pair, atomic_resolution, step_base_quantums, step_size, min_price_change)
    let table = [
        (0_u32, "BTC-USD", -8_i32, 1_000_000_u64, Decimal::new(1, 2), Decimal::ONE),
        (1, "ETH-USD", -18, 1_000_000_000_000_000_000, Decimal::ONE, Decimal::new(1, 1)),
        (2, "SOL-USD", -9, 1_000_000_000, Decimal::ONE, Decimal::new(1, 2)),
    ];

    table
        .into_iter()
        .map(
            |(id, pair, atomic_resolution, step_base_quantums, step_size, min_price_change)| {
                MarketMetadata {
                    id,
                    pair: pair.to_string(),
                    atomic_resolution,
                    quantum_conversion_exponent: DEFAULT_QUANTUM_CONVERSION_EXPONENT,
                    subticks_per_tick: 1_000_000,
                    step_base_quantums,
                    min_price_change,
                    step_size,
                    oracle_price: None,
                    cache_time: now,
                }
            },
        )
        .map(|m| (m.pair.clone(), m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_table() {
        let markets = fallback_markets();
        assert_eq!(markets.len(), 3);

        let btc = &markets["BTC-USD"];
        assert_eq!(btc.id, 0);
        assert_eq!(btc.atomic_resolution, -8);
        assert_eq!(btc.subticks_per_tick, 1_000_000);
        assert_eq!(btc.step_base_quantums, 1_000_000);

        assert_eq!(markets["ETH-USD"].step_base_quantums, 10_u64.pow(18));
        assert_eq!(markets["SOL-USD"].step_base_quantums, 10_u64.pow(9));
    }

    #[test]
    fn subticks_exponent_combines_resolutions() {
        let btc = &fallback_markets()["BTC-USD"];
        // -8 - (-9) - (-6)
        assert_eq!(btc.subticks_exponent(), 7);
    }
}
