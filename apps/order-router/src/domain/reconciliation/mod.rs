//! Reconciliation findings.
//!
//! Findings are data, not errors: severity decides whether the reconciler
//! repairs a divergence or only reports it.

mod inconsistency;
mod result;

pub use inconsistency::{Inconsistency, InconsistencyKind, Resolution, Severity};
pub use result::ReconciliationResult;
