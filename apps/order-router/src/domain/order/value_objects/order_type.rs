//! Order type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::order::OrderError;

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Execute immediately at the best available price.
    Market,
    /// Rest on the book at a limit price.
    Limit,
    /// Market order triggered at a stop price.
    StopMarket,
    /// Limit order triggered at a stop price.
    StopLimit,
    /// Market order triggered at a take-profit price.
    TakeProfitMarket,
    /// Limit order triggered at a take-profit price.
    TakeProfitLimit,
}

impl OrderType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopMarket => "STOP_MARKET",
            Self::StopLimit => "STOP_LIMIT",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            Self::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
        }
    }

    /// Returns true if an order of this type must carry a limit price.
    #[must_use]
    pub const fn requires_price(&self) -> bool {
        matches!(
            self,
            Self::Limit | Self::StopLimit | Self::TakeProfitLimit
        )
    }

    /// Returns true for the market family (executes at a protection price).
    #[must_use]
    pub const fn is_market(&self) -> bool {
        !self.requires_price()
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MARKET" => Ok(Self::Market),
            "LIMIT" => Ok(Self::Limit),
            "STOP_MARKET" => Ok(Self::StopMarket),
            "STOP_LIMIT" => Ok(Self::StopLimit),
            "TAKE_PROFIT_MARKET" | "TAKE_PROFIT" => Ok(Self::TakeProfitMarket),
            "TAKE_PROFIT_LIMIT" => Ok(Self::TakeProfitLimit),
            other => Err(OrderError::validation(
                "type",
                format!("invalid order type: {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(OrderType::Market, false)]
    #[test_case(OrderType::Limit, true)]
    #[test_case(OrderType::StopMarket, false)]
    #[test_case(OrderType::StopLimit, true)]
    #[test_case(OrderType::TakeProfitMarket, false)]
    #[test_case(OrderType::TakeProfitLimit, true)]
    fn price_requirement(order_type: OrderType, requires_price: bool) {
        assert_eq!(order_type.requires_price(), requires_price);
        assert_eq!(order_type.is_market(), !requires_price);
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!(
            "STOP_LIMIT".parse::<OrderType>().unwrap(),
            OrderType::StopLimit
        );
        assert_eq!(
            "TAKE_PROFIT".parse::<OrderType>().unwrap(),
            OrderType::TakeProfitMarket
        );
        assert!("ICEBERG".parse::<OrderType>().is_err());
    }
}
