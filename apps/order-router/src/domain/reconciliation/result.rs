//! Result of a reconciliation pass.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::inconsistency::{Inconsistency, InconsistencyKind, Severity};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    /// Remote orders examined.
    pub total_orders: usize,
    /// Orders found consistent or corrected.
    pub synced_orders: usize,
    /// Orders whose correction failed.
    pub failed_orders: usize,
    /// All findings.
    pub inconsistencies: Vec<Inconsistency>,
    /// Wall time of the pass.
    pub duration: Duration,
    /// When the pass started.
    pub timestamp: DateTime<Utc>,
}

impl ReconciliationResult {
    /// Empty result stamped now.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_orders: 0,
            synced_orders: 0,
            failed_orders: 0,
            inconsistencies: Vec::new(),
            duration: Duration::ZERO,
            timestamp: Utc::now(),
        }
    }

    /// Count findings by kind.
    #[must_use]
    pub fn inconsistency_summary(&self) -> BTreeMap<InconsistencyKind, usize> {
        let mut summary = BTreeMap::new();
        for inconsistency in &self.inconsistencies {
            *summary.entry(inconsistency.kind).or_insert(0) += 1;
        }
        summary
    }

    /// Returns true if any finding is HIGH severity.
    #[must_use]
    pub fn has_critical_inconsistencies(&self) -> bool {
        self.inconsistencies
            .iter()
            .any(|i| i.severity == Severity::High)
    }
}
