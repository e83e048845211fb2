//! Reconciler
//!
//! Compares the ledger with the indexer's view of the tracked address and
//! classifies every divergence. Status and size drift is corrected in place
//! (the indexer is authoritative for fills); orders missing on either side
//! are only reported.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::{UnlinkedOrders, resolve_local_order, update_with_retry};
use super::order_sync::map_remote_status;
use super::worker::{BackgroundLoop, ServiceError};
use crate::application::ports::{IndexerOrder, IndexerPort};
use crate::domain::order::{Order, OrderRepository};
use crate::domain::reconciliation::{
    Inconsistency, InconsistencyKind, ReconciliationResult, Resolution,
};
use crate::observability::record_reconciliation;
use crate::resilience::ResilientExecutor;

/// Default pass interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Local orders considered per pass.
const LOCAL_BATCH_LIMIT: u32 = 1000;

/// Reconciler settings.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Address reconciled by the periodic loop.
    pub address: String,
    /// Interval between periodic passes.
    pub interval: Duration,
}

enum Outcome {
    Consistent,
    Corrected,
    Failed,
}

/// Ledger/indexer reconciliation.
pub struct Reconciler {
    indexer: Arc<dyn IndexerPort>,
    repository: Arc<dyn OrderRepository>,
    executor: ResilientExecutor,
    config: ReconcilerConfig,
    last_result: RwLock<Option<ReconciliationResult>>,
    worker: BackgroundLoop,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a stopped reconciler.
    #[must_use]
    pub fn new(
        indexer: Arc<dyn IndexerPort>,
        repository: Arc<dyn OrderRepository>,
        executor: ResilientExecutor,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            indexer,
            repository,
            executor,
            config,
            last_result: RwLock::new(None),
            worker: BackgroundLoop::new("reconciler"),
        }
    }

    /// Run one reconciliation pass for `address`.
    ///
    /// Per-order correction failures are recorded as findings and do not
    /// abort the pass. Zero remote orders yields an empty result.
    pub async fn reconcile_orders(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationResult, ServiceError> {
        let started = tokio::time::Instant::now();
        let timestamp = Utc::now();

        let remote = self
            .executor
            .execute(cancel, || self.indexer.get_orders(address, None, None))
            .await?
            .orders;

        if remote.is_empty() {
            debug!(address, "No remote orders to reconcile");
            let result = ReconciliationResult::empty();
            self.finish(&result);
            return Ok(result);
        }

        let tracked = self.repository.get_orders_for_sync(LOCAL_BATCH_LIMIT).await?;
        let mut unlinked = UnlinkedOrders::new(tracked.clone());

        let mut result = ReconciliationResult {
            total_orders: remote.len(),
            timestamp,
            ..ReconciliationResult::empty()
        };

        for order in &remote {
            let found = match resolve_local_order(self.repository.as_ref(), order, &mut unlinked).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(remote_id = %order.id, error = %e, "Ledger lookup failed during reconciliation");
                    result.failed_orders += 1;
                    continue;
                }
            };

            let Some(found) = found else {
                result.inconsistencies.push(finding(
                    order,
                    InconsistencyKind::MissingInDb,
                    "missing".to_string(),
                    order.status.clone(),
                    format!("order {} exists on chain but not in the ledger", order.id),
                    Resolution::ReportedOnly,
                ));
                continue;
            };

            match self
                .reconcile_one(order, found.order, found.linked, &mut result.inconsistencies)
                .await
            {
                Outcome::Consistent | Outcome::Corrected => result.synced_orders += 1,
                Outcome::Failed => result.failed_orders += 1,
            }
        }

        let remote_ids: HashSet<&str> = remote.iter().map(|o| o.id.as_str()).collect();
        for local in tracked.iter().filter(|o| o.status.is_active()) {
            let Some(order_id) = local.order_id.as_deref() else {
                continue;
            };
            if remote_ids.contains(order_id) {
                continue;
            }
            result.inconsistencies.push(Inconsistency {
                order_id: order_id.to_string(),
                kind: InconsistencyKind::MissingInChain,
                db_value: local.status.to_string(),
                chain_value: "missing".to_string(),
                description: format!("active order {order_id} not reported by the indexer"),
                severity: Inconsistency::severity_for(InconsistencyKind::MissingInChain),
                resolution: Resolution::ReportedOnly,
            });
        }

        result.duration = started.elapsed();
        self.finish(&result);
        Ok(result)
    }

    async fn reconcile_one(
        &self,
        remote: &IndexerOrder,
        mut local: Order,
        linked: bool,
        findings: &mut Vec<Inconsistency>,
    ) -> Outcome {
        let status = map_remote_status(&remote.status);
        let filled = remote.filled_size();

        let mut found = Vec::new();
        if local.status != status {
            found.push((
                InconsistencyKind::StatusMismatch,
                local.status.to_string(),
                status.to_string(),
                format!("status {} in ledger, {} on chain", local.status, remote.status),
            ));
        }
        if local.filled_size != filled {
            found.push((
                InconsistencyKind::SizeMismatch,
                local.filled_size.to_string(),
                filled.to_string(),
                format!("filled {} in ledger, {} on chain", local.filled_size, filled),
            ));
        }

        if found.is_empty() && !linked {
            return Outcome::Consistent;
        }

        let reason = (!found.is_empty()).then(|| {
            format!("reconciled with chain (remote status {})", remote.status)
        });
        let written = update_with_retry(self.repository.as_ref(), &mut local, reason, |o| {
            o.order_id = Some(remote.id.clone());
            o.apply_fill(filled)?;
            if o.status != status {
                o.set_status(status);
            }
            Ok(())
        })
        .await;

        let resolution = match &written {
            Ok(()) => Resolution::AutoCorrected,
            Err(e) => {
                warn!(order_id = %local.id, remote_id = %remote.id, error = %e, "Reconciliation correction failed");
                Resolution::CorrectionFailed
            }
        };
        for (kind, db_value, chain_value, description) in found {
            findings.push(finding(remote, kind, db_value, chain_value, description, resolution));
        }

        if written.is_ok() {
            Outcome::Corrected
        } else {
            Outcome::Failed
        }
    }

    fn finish(&self, result: &ReconciliationResult) {
        let critical = result.has_critical_inconsistencies();
        record_reconciliation(result.total_orders, result.inconsistencies.len(), critical);
        info!(
            total_orders = result.total_orders,
            synced_orders = result.synced_orders,
            failed_orders = result.failed_orders,
            inconsistencies = result.inconsistencies.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Reconciliation pass complete"
        );
        if critical {
            warn!(
                summary = ?result.inconsistency_summary(),
                "Reconciliation found critical inconsistencies"
            );
        }
        *self.last_result.write() = Some(result.clone());
    }

    /// Result of the most recent pass.
    #[must_use]
    pub fn last_result(&self) -> Option<ReconciliationResult> {
        self.last_result.read().clone()
    }

    /// Start periodic passes for the configured address.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> Result<(), ServiceError> {
        let service = Arc::clone(self);
        self.worker.start(parent, self.config.interval, move |cancel| {
            let service = Arc::clone(&service);
            async move {
                if let Err(e) = service
                    .reconcile_orders(&service.config.address, &cancel)
                    .await
                {
                    warn!(error = %e, "Reconciliation pass failed");
                }
            }
        })
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(&self) {
        self.worker.stop().await;
    }

    /// Returns true while the loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

fn finding(
    remote: &IndexerOrder,
    kind: InconsistencyKind,
    db_value: String,
    chain_value: String,
    description: String,
    resolution: Resolution,
) -> Inconsistency {
    Inconsistency {
        order_id: remote.id.clone(),
        kind,
        db_value,
        chain_value,
        description,
        severity: Inconsistency::severity_for(kind),
        resolution,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{MockIndexerPort, OrdersResponse};
    use crate::application::services::test_support::{order, remote_order, resilient_executor};
    use crate::domain::order::{OrderStatus, OrderType};
    use crate::domain::reconciliation::Severity;
    use crate::infrastructure::persistence::InMemoryOrderRepository;

    fn reconciler(orders: Vec<IndexerOrder>, repo: Arc<InMemoryOrderRepository>) -> Reconciler {
        let mut indexer = MockIndexerPort::new();
        indexer.expect_get_orders().returning(move |_, _, _| {
            Ok(OrdersResponse {
                orders: orders.clone(),
            })
        });
        Reconciler::new(
            Arc::new(indexer),
            repo,
            resilient_executor("indexer-queries"),
            ReconcilerConfig {
                address: "dydx1test".into(),
                interval: DEFAULT_RECONCILE_INTERVAL,
            },
        )
    }

    async fn open_order(repo: &InMemoryOrderRepository, order_id: &str) -> Order {
        let mut local = order(OrderType::Limit, Some(dec!(50000)));
        local.order_id = Some(order_id.into());
        local.set_status(OrderStatus::Open);
        repo.create_order(&local).await.unwrap();
        local
    }

    #[tokio::test]
    async fn corrects_filled_order() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let local = open_order(&repo, "ex-1").await;

        let result = reconciler(
            vec![remote_order("ex-1", "1", "FILLED", dec!(0.5), dec!(0))],
            Arc::clone(&repo),
        )
        .reconcile_orders("dydx1test", &CancellationToken::new())
        .await
        .unwrap();

        let status: Vec<_> = result
            .inconsistencies
            .iter()
            .filter(|i| i.kind == InconsistencyKind::StatusMismatch)
            .collect();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].severity, Severity::Medium);
        assert_eq!(status[0].resolution, Resolution::AutoCorrected);
        assert_eq!(result.synced_orders, 1);
        assert!(!result.has_critical_inconsistencies());

        let stored = repo.get_order_by_id(local.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Filled);
        assert_eq!(stored.filled_size, dec!(0.5));
        assert_eq!(stored.remaining_size, dec!(0));

        let history = repo.get_order_history(local.id).await.unwrap();
        assert_eq!(history.last().unwrap().new_status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn reports_orders_missing_on_either_side() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        open_order(&repo, "ex-local-only").await;

        let result = reconciler(
            vec![remote_order("ex-remote-only", "7", "OPEN", dec!(1), dec!(1))],
            Arc::clone(&repo),
        )
        .reconcile_orders("dydx1test", &CancellationToken::new())
        .await
        .unwrap();

        let summary = result.inconsistency_summary();
        assert_eq!(summary.get(&InconsistencyKind::MissingInDb), Some(&1));
        assert_eq!(summary.get(&InconsistencyKind::MissingInChain), Some(&1));
        assert!(result.has_critical_inconsistencies());
        assert!(
            result
                .inconsistencies
                .iter()
                .all(|i| i.resolution == Resolution::ReportedOnly)
        );
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn consistent_orders_produce_no_findings() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        open_order(&repo, "ex-1").await;

        let result = reconciler(
            vec![remote_order("ex-1", "1", "OPEN", dec!(0.5), dec!(0.5))],
            Arc::clone(&repo),
        )
        .reconcile_orders("dydx1test", &CancellationToken::new())
        .await
        .unwrap();

        assert!(result.inconsistencies.is_empty());
        assert_eq!(result.synced_orders, 1);
    }

    #[tokio::test]
    async fn failed_correction_is_recorded() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        open_order(&repo, "ex-1").await;

        // remote filled exceeds the local size
        let result = reconciler(
            vec![remote_order("ex-1", "1", "FILLED", dec!(3), dec!(0))],
            Arc::clone(&repo),
        )
        .reconcile_orders("dydx1test", &CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(result.failed_orders, 1);
        assert!(
            result
                .inconsistencies
                .iter()
                .all(|i| i.resolution == Resolution::CorrectionFailed)
        );
    }

    #[tokio::test]
    async fn empty_remote_listing_is_an_empty_result() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        open_order(&repo, "ex-1").await;

        let service = reconciler(Vec::new(), repo);
        let result = service
            .reconcile_orders("dydx1test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_orders, 0);
        assert!(result.inconsistencies.is_empty());
        assert!(service.last_result().is_some());
    }
}
