//! Order status in the lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::order::OrderError;

/// Order status.
///
/// ```text
/// PENDING → OPEN → PARTIALLY_FILLED → FILLED
///    │        │            │
///    └→ REJECTED  └→ CANCELLED / EXPIRED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Persisted locally, not yet broadcast.
    Pending,
    /// Accepted on chain and resting.
    Open,
    /// Completely filled.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Broadcast failed or was refused.
    Rejected,
    /// Expired on chain.
    Expired,
    /// Partially filled, remainder still resting.
    PartiallyFilled,
}

impl OrderStatus {
    /// All statuses, in ledger order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Open,
        Self::Filled,
        Self::Cancelled,
        Self::Rejected,
        Self::Expired,
        Self::PartiallyFilled,
    ];

    /// Ledger name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
        }
    }

    /// Returns true if the order can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is live on chain.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }

    /// Returns true if a cancel may be submitted.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.is_active()
    }

    /// Returns true if the sync services should track the order.
    #[must_use]
    pub const fn needs_sync(&self) -> bool {
        matches!(self, Self::Pending | Self::Open | Self::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::validation("status", format!("invalid order status: {s}")))
    }
}
