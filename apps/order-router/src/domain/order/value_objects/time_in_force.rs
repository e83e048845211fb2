//! Time in force.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::order::OrderError;

/// How long an order remains eligible for matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good til block (or block time).
    #[default]
    Gtt,
    /// Fill or kill.
    Fok,
    /// Immediate or cancel.
    Ioc,
}

impl TimeInForce {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gtt => "GTT",
            Self::Fok => "FOK",
            Self::Ioc => "IOC",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeInForce {
    type Err = OrderError;

    /// Empty input selects the default (GTT).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "GTT" => Ok(Self::Gtt),
            "FOK" => Ok(Self::Fok),
            "IOC" => Ok(Self::Ioc),
            other => Err(OrderError::validation(
                "time_in_force",
                format!("invalid time in force: {other}"),
            )),
        }
    }
}
