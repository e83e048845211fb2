//! Conversion of human-readable size and price to protocol integers.
//!
//! ```text
//! quantums = floor(size / 10^atomic_resolution)
//! subticks = round(price / 10^-subticks_exponent)
//! ```
//!
//! All arithmetic uses `Decimal`; sizes and prices never pass through
//! floating point.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::errors::QuantizationError;

/// Largest power of ten representable by `Decimal`.
const MAX_DECIMAL_EXPONENT: u32 = 28;

/// `value * 10^exponent`, or `None` on overflow.
fn scale_by_power_of_ten(value: Decimal, exponent: i32) -> Option<Decimal> {
    let magnitude = exponent.unsigned_abs();
    if magnitude > MAX_DECIMAL_EXPONENT {
        return None;
    }
    let factor = Decimal::from_i128_with_scale(10_i128.pow(magnitude), 0);
    if exponent >= 0 {
        value.checked_mul(factor)
    } else {
        value.checked_div(factor)
    }
}

fn to_protocol_units(
    field: &'static str,
    original: Decimal,
    scaled: Option<Decimal>,
) -> Result<u64, QuantizationError> {
    let units = scaled
        .and_then(|v| v.to_u64())
        .ok_or_else(|| QuantizationError::Overflow {
            field,
            value: original.to_string(),
        })?;
    if units == 0 {
        return Err(QuantizationError::BelowResolution {
            field,
            value: original.to_string(),
        });
    }
    Ok(units)
}

/// Convert a size in base units to quantums (rounded down).
pub fn quantize_size(size: Decimal, atomic_resolution: i32) -> Result<u64, QuantizationError> {
    if size <= Decimal::ZERO {
        return Err(QuantizationError::NonPositive {
            field: "size",
            value: size.to_string(),
        });
    }

    let scaled = atomic_resolution
        .checked_neg()
        .and_then(|exponent| scale_by_power_of_ten(size, exponent))
        .map(|v| v.floor());
    let quantums = to_protocol_units("size", size, scaled)?;

    tracing::debug!(%size, atomic_resolution, quantums, "Quantized size");
    Ok(quantums)
}

/// Convert a price in quote units to subticks (rounded half away from zero).
pub fn quantize_price(price: Decimal, subticks_exponent: i32) -> Result<u64, QuantizationError> {
    if price <= Decimal::ZERO {
        return Err(QuantizationError::NonPositive {
            field: "price",
            value: price.to_string(),
        });
    }

    let scaled = scale_by_power_of_ten(price, subticks_exponent)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero));
    let subticks = to_protocol_units("price", price, scaled)?;

    tracing::debug!(%price, subticks_exponent, subticks, "Quantized price");
    Ok(subticks)
}

/// Check that `quantums` is an exact multiple of the market step.
pub fn validate_quantization(
    quantums: u64,
    subticks: u64,
    step_base_quantums: u64,
) -> Result<(), QuantizationError> {
    if step_base_quantums == 0 || quantums % step_base_quantums != 0 {
        return Err(QuantizationError::InvalidQuantization {
            quantums,
            step_base_quantums,
        });
    }
    if subticks == 0 {
        return Err(QuantizationError::BelowResolution {
            field: "price",
            value: "0".to_string(),
        });
    }
    Ok(())
}

/// Convert quantums back to a size in base units.
#[must_use]
pub fn dequantize_size(quantums: u64, atomic_resolution: i32) -> Option<Decimal> {
    scale_by_power_of_ten(Decimal::from(quantums), atomic_resolution)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn quantizes_btc_size() {
        assert_eq!(quantize_size(dec!(0.01), -8).unwrap(), 1_000_000);
        assert_eq!(quantize_size(dec!(1.5), -8).unwrap(), 150_000_000);
    }

    #[test]
    fn size_is_floored() {
        assert_eq!(quantize_size(dec!(0.000000019), -8).unwrap(), 1);
    }

    #[test]
    fn quantizes_eth_size_at_eighteen_decimals() {
        assert_eq!(
            quantize_size(dec!(2), -18).unwrap(),
            2_000_000_000_000_000_000
        );
    }

    #[test]
    fn rejects_non_positive_and_tiny_sizes() {
        assert!(matches!(
            quantize_size(Decimal::ZERO, -8),
            Err(QuantizationError::NonPositive { .. })
        ));
        assert!(matches!(
            quantize_size(dec!(-1), -8),
            Err(QuantizationError::NonPositive { .. })
        ));
        assert!(matches!(
            quantize_size(dec!(0.000000001), -8),
            Err(QuantizationError::BelowResolution { .. })
        ));
        assert!(matches!(
            quantize_size(dec!(100), -18),
            Err(QuantizationError::Overflow { .. })
        ));
    }

    #[test]
    fn quantizes_price_with_rounding() {
        assert_eq!(quantize_price(dec!(50000), 7).unwrap(), 500_000_000_000);
        assert_eq!(quantize_price(dec!(1.25), 1).unwrap(), 13);
        assert_eq!(quantize_price(dec!(1.24), 1).unwrap(), 12);
        assert_eq!(quantize_price(dec!(1500), -2).unwrap(), 15);
    }

    #[test]
    fn quantizes_price_without_float_drift() {
        // 0.1 + 0.2 style values stay exact.
        assert_eq!(quantize_price(dec!(0.3), 1).unwrap(), 3);
        assert_eq!(quantize_price(dec!(2034.17), 2).unwrap(), 203_417);
    }

    #[test]
    fn rejects_non_positive_price() {
        assert!(quantize_price(Decimal::ZERO, 7).is_err());
        assert!(quantize_price(dec!(-5), 7).is_err());
    }

    #[test]
    fn validates_step_alignment() {
        assert!(validate_quantization(3_000_000, 10, 1_000_000).is_ok());
        assert_eq!(
            validate_quantization(1_500_000, 10, 1_000_000),
            Err(QuantizationError::InvalidQuantization {
                quantums: 1_500_000,
                step_base_quantums: 1_000_000,
            })
        );
        assert!(validate_quantization(1_000_000, 10, 0).is_err());
        assert!(validate_quantization(1_000_000, 0, 1_000_000).is_err());
    }

    proptest! {
        #[test]
        fn quantize_recovers_size_within_step(
            steps in 1_u64..100_000,
            remainder in 0_u64..1_000_000,
        ) {
            let step = 1_000_000_u64;
            let atomic_resolution = -8;
            let quantums_in = steps * step + remainder;
            let size = dequantize_size(quantums_in, atomic_resolution).unwrap();

            let quantums = quantize_size(size, atomic_resolution).unwrap();
            prop_assert_eq!(quantums, quantums_in);

            let recovered = dequantize_size(quantums, atomic_resolution).unwrap();
            let step_size = dequantize_size(step, atomic_resolution).unwrap();
            prop_assert!((size - recovered).abs() < step_size);

            let aligned = validate_quantization(quantums, 1, step).is_ok();
            prop_assert_eq!(aligned, remainder == 0);
        }
    }
}
