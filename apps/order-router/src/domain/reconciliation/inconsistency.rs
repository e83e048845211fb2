//! Divergences between the ledger and chain/indexer state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InconsistencyKind {
    /// Local status differs from the remote status.
    StatusMismatch,
    /// Local filled size differs from the remote filled size.
    SizeMismatch,
    /// Remote order has no local row.
    MissingInDb,
    /// Active local order is absent remotely.
    MissingInChain,
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusMismatch => write!(f, "STATUS_MISMATCH"),
            Self::SizeMismatch => write!(f, "SIZE_MISMATCH"),
            Self::MissingInDb => write!(f, "MISSING_IN_DB"),
            Self::MissingInChain => write!(f, "MISSING_IN_CHAIN"),
        }
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational.
    Low,
    /// Auto-corrected drift.
    Medium,
    /// Needs an operator.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// What the reconciler did about a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    /// Ledger overwritten with the remote value.
    AutoCorrected,
    /// Correction attempted but the ledger write failed.
    CorrectionFailed,
    /// Recorded for an operator; nothing changed.
    ReportedOnly,
}

/// One reconciliation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Exchange order id.
    pub order_id: String,
    /// Kind of divergence.
    pub kind: InconsistencyKind,
    /// Ledger value.
    pub db_value: String,
    /// Chain/indexer value.
    pub chain_value: String,
    /// Human-readable description.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// Action taken.
    pub resolution: Resolution,
}

impl Inconsistency {
    /// Default severity for a kind.
    #[must_use]
    pub const fn severity_for(kind: InconsistencyKind) -> Severity {
        match kind {
            InconsistencyKind::MissingInDb => Severity::High,
            InconsistencyKind::StatusMismatch | InconsistencyKind::SizeMismatch => {
                Severity::Medium
            }
            InconsistencyKind::MissingInChain => Severity::Low,
        }
    }
}
