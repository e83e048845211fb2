//! Background loop settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sync and reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the background loops.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Address to track; empty means the signer's address.
    #[serde(default)]
    pub address: String,
    /// Seconds between order sync cycles.
    #[serde(default = "default_order_interval")]
    pub order_interval_secs: u64,
    /// Seconds between position sync cycles.
    #[serde(default = "default_position_interval")]
    pub position_interval_secs: u64,
    /// Seconds between reconciliation passes.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    /// Maximum local orders examined per order sync cycle.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            address: String::new(),
            order_interval_secs: default_order_interval(),
            position_interval_secs: default_position_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl SyncConfig {
    /// Order sync interval.
    #[must_use]
    pub const fn order_interval(&self) -> Duration {
        Duration::from_secs(self.order_interval_secs)
    }

    /// Position sync interval.
    #[must_use]
    pub const fn position_interval(&self) -> Duration {
        Duration::from_secs(self.position_interval_secs)
    }

    /// Reconciliation interval.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_order_interval() -> u64 {
    10
}

const fn default_position_interval() -> u64 {
    30
}

const fn default_reconcile_interval() -> u64 {
    300
}

const fn default_batch_limit() -> u32 {
    500
}
