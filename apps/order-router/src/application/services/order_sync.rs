//! Order Sync Service
//!
//! Pulls the tracked address's orders from the indexer on a fixed interval
//! and writes fill progress and status into the ledger. Remote orders with
//! no local row are skipped; rows are only ever created by the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ledger::{UnlinkedOrders, resolve_local_order, update_with_retry};
use super::worker::{BackgroundLoop, ServiceError};
use crate::application::ports::{IndexerOrder, IndexerPort};
use crate::domain::order::{OrderError, OrderRepository, OrderStatus};
use crate::observability::record_sync_cycle;
use crate::resilience::ResilientExecutor;

/// Default poll interval.
pub const DEFAULT_ORDER_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Map an indexer status string to the ledger vocabulary.
///
/// Unknown statuses map to `Pending` so the order stays tracked.
#[must_use]
pub fn map_remote_status(status: &str) -> OrderStatus {
    match status {
        "OPEN" | "BEST_EFFORT_OPENED" => OrderStatus::Open,
        "FILLED" => OrderStatus::Filled,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "CANCELED" | "CANCELLED" | "BEST_EFFORT_CANCELED" => OrderStatus::Cancelled,
        "EXPIRED" => OrderStatus::Expired,
        "UNTRIADED" => OrderStatus::Pending,
        other => {
            warn!(status = other, "Unknown remote order status, treating as pending");
            OrderStatus::Pending
        }
    }
}

/// Order sync settings.
#[derive(Debug, Clone)]
pub struct OrderSyncConfig {
    /// Address whose orders are tracked.
    pub address: String,
    /// Poll interval.
    pub interval: Duration,
    /// Maximum unlinked local orders considered per cycle.
    pub batch_limit: u32,
}

impl OrderSyncConfig {
    /// Defaults for `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            interval: DEFAULT_ORDER_SYNC_INTERVAL,
            batch_limit: 500,
        }
    }
}

/// Counters for one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderSyncStats {
    /// Remote orders fetched.
    pub fetched: usize,
    /// Ledger rows written.
    pub updated: usize,
    /// Remote orders already matching the ledger.
    pub unchanged: usize,
    /// Remote orders with no local row.
    pub skipped: usize,
    /// Remote orders whose ledger write failed.
    pub failed: usize,
}

/// Background order synchronization.
pub struct OrderSyncService {
    indexer: Arc<dyn IndexerPort>,
    repository: Arc<dyn OrderRepository>,
    executor: ResilientExecutor,
    config: OrderSyncConfig,
    worker: BackgroundLoop,
}

impl std::fmt::Debug for OrderSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSyncService")
            .field("config", &self.config)
            .field("running", &self.worker.is_running())
            .finish_non_exhaustive()
    }
}

impl OrderSyncService {
    /// Create a stopped service.
    #[must_use]
    pub fn new(
        indexer: Arc<dyn IndexerPort>,
        repository: Arc<dyn OrderRepository>,
        executor: ResilientExecutor,
        config: OrderSyncConfig,
    ) -> Self {
        Self {
            indexer,
            repository,
            executor,
            config,
            worker: BackgroundLoop::new("order-sync"),
        }
    }

    /// Fetch remote orders once and apply them to the ledger.
    ///
    /// A failed fetch fails the cycle; a failed write for one order is logged
    /// and the remaining orders are still processed.
    pub async fn sync_once(&self, cancel: &CancellationToken) -> Result<OrderSyncStats, ServiceError> {
        let address = self.config.address.as_str();
        let response = match self
            .executor
            .execute(cancel, || self.indexer.get_orders(address, None, None))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                record_sync_cycle("orders", false, 0);
                return Err(e.into());
            }
        };

        let local = self
            .repository
            .get_orders_for_sync(self.config.batch_limit)
            .await?;
        let mut unlinked = UnlinkedOrders::new(local);

        let mut stats = OrderSyncStats {
            fetched: response.orders.len(),
            ..OrderSyncStats::default()
        };

        for remote in &response.orders {
            match self.apply_remote(remote, &mut unlinked).await {
                Ok(Some(true)) => stats.updated += 1,
                Ok(Some(false)) => stats.unchanged += 1,
                Ok(None) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(remote_id = %remote.id, error = %e, "Failed to sync order");
                }
            }
        }

        debug!(
            fetched = stats.fetched,
            updated = stats.updated,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            failed = stats.failed,
            "Order sync cycle complete"
        );
        record_sync_cycle("orders", true, stats.fetched);
        Ok(stats)
    }

    /// `None` when there is no local row, otherwise whether a write happened.
    async fn apply_remote(
        &self,
        remote: &IndexerOrder,
        unlinked: &mut UnlinkedOrders,
    ) -> Result<Option<bool>, OrderError> {
        let Some(found) = resolve_local_order(self.repository.as_ref(), remote, unlinked).await?
        else {
            debug!(remote_id = %remote.id, "Remote order not in ledger, skipping");
            return Ok(None);
        };

        let mut order = found.order;
        let status = map_remote_status(&remote.status);
        let filled = remote.filled_size();
        if !found.linked && order.status == status && order.filled_size == filled {
            return Ok(Some(false));
        }

        let reason = Some(format!("synced from indexer (remote status {})", remote.status));
        update_with_retry(self.repository.as_ref(), &mut order, reason, |o| {
            o.order_id = Some(remote.id.clone());
            o.apply_fill(filled)?;
            if o.status != status {
                o.set_status(status);
            }
            Ok(())
        })
        .await?;

        Ok(Some(true))
    }

    /// Start the periodic loop; the first cycle runs immediately.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> Result<(), ServiceError> {
        let service = Arc::clone(self);
        self.worker.start(parent, self.config.interval, move |cancel| {
            let service = Arc::clone(&service);
            async move {
                if let Err(e) = service.sync_once(&cancel).await {
                    warn!(error = %e, "Order sync cycle failed");
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

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;
    use crate::application::ports::{IndexerError, MockIndexerPort, OrdersResponse};
    use crate::application::services::test_support::{order, remote_order, resilient_executor};
    use crate::domain::order::OrderType;
    use crate::infrastructure::persistence::InMemoryOrderRepository;

    #[test_case("OPEN", OrderStatus::Open)]
    #[test_case("BEST_EFFORT_OPENED", OrderStatus::Open)]
    #[test_case("FILLED", OrderStatus::Filled)]
    #[test_case("PARTIALLY_FILLED", OrderStatus::PartiallyFilled)]
    #[test_case("CANCELED", OrderStatus::Cancelled)]
    #[test_case("CANCELLED", OrderStatus::Cancelled)]
    #[test_case("BEST_EFFORT_CANCELED", OrderStatus::Cancelled)]
    #[test_case("EXPIRED", OrderStatus::Expired)]
    #[test_case("UNTRIADED", OrderStatus::Pending)]
    #[test_case("SOMETHING_NEW", OrderStatus::Pending)]
    fn maps_remote_statuses(remote: &str, expected: OrderStatus) {
        assert_eq!(map_remote_status(remote), expected);
    }

    fn indexer_returning(orders: Vec<IndexerOrder>) -> MockIndexerPort {
        let mut indexer = MockIndexerPort::new();
        indexer.expect_get_orders().returning(move |_, _, _| {
            Ok(OrdersResponse {
                orders: orders.clone(),
            })
        });
        indexer
    }

    fn service(indexer: MockIndexerPort, repo: Arc<InMemoryOrderRepository>) -> OrderSyncService {
        OrderSyncService::new(
            Arc::new(indexer),
            repo,
            resilient_executor("indexer-queries"),
            OrderSyncConfig::new("dydx1test"),
        )
    }

    #[tokio::test]
    async fn applies_fills_and_skips_unknown_orders() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let mut local = order(OrderType::Limit, Some(dec!(50000)));
        local.order_id = Some("ex-1".into());
        local.set_status(OrderStatus::Open);
        repo.create_order(&local).await.unwrap();

        let indexer = indexer_returning(vec![
            remote_order("ex-1", "1", "PARTIALLY_FILLED", dec!(0.5), dec!(0.2)),
            remote_order("ex-unknown", "2", "OPEN", dec!(1), dec!(1)),
        ]);
        let stats = service(indexer, Arc::clone(&repo))
            .sync_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 1);

        let stored = repo.get_order_by_id(local.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::PartiallyFilled);
        assert_eq!(stored.filled_size, dec!(0.3));
        assert_eq!(stored.remaining_size, dec!(0.2));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn links_pending_order_by_client_id() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let local = order(OrderType::Limit, Some(dec!(50000)));
        repo.create_order(&local).await.unwrap();
        let protocol_id = crate::domain::market::protocol_client_id(
            crate::domain::market::client_order_id_for(&local.client_id),
        );

        let indexer = indexer_returning(vec![remote_order(
            "ex-9",
            &protocol_id.to_string(),
            "FILLED",
            dec!(0.5),
            dec!(0),
        )]);
        service(indexer, Arc::clone(&repo))
            .sync_once(&CancellationToken::new())
            .await
            .unwrap();

        let stored = repo.get_order_by_order_id("ex-9").await.unwrap();
        assert_eq!(stored.id, local.id);
        assert_eq!(stored.status, OrderStatus::Filled);
        assert!(stored.filled_at.is_some());
    }

    #[tokio::test]
    async fn unchanged_orders_are_not_rewritten() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let mut local = order(OrderType::Limit, Some(dec!(50000)));
        local.order_id = Some("ex-1".into());
        local.set_status(OrderStatus::Open);
        repo.create_order(&local).await.unwrap();

        let indexer = indexer_returning(vec![remote_order("ex-1", "1", "OPEN", dec!(0.5), dec!(0.5))]);
        let stats = service(indexer, Arc::clone(&repo))
            .sync_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.unchanged, 1);
        assert_eq!(repo.get_order_by_id(local.id).await.unwrap().version, local.version);
    }

    #[tokio::test]
    async fn invalid_remote_fill_does_not_abort_batch() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let mut first = order(OrderType::Limit, Some(dec!(50000)));
        first.order_id = Some("ex-1".into());
        first.set_status(OrderStatus::Open);
        let mut second = order(OrderType::Limit, Some(dec!(50000)));
        second.order_id = Some("ex-2".into());
        second.set_status(OrderStatus::Open);
        repo.create_order(&first).await.unwrap();
        repo.create_order(&second).await.unwrap();

        // ex-1 reports more filled than the local size
        let indexer = indexer_returning(vec![
            remote_order("ex-1", "1", "FILLED", dec!(2), dec!(0)),
            remote_order("ex-2", "2", "FILLED", dec!(0.5), dec!(0)),
        ]);
        let stats = service(indexer, Arc::clone(&repo))
            .sync_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(
            repo.get_order_by_id(second.id).await.unwrap().status,
            OrderStatus::Filled
        );
        assert_eq!(
            repo.get_order_by_id(first.id).await.unwrap().status,
            OrderStatus::Open
        );
    }

    #[tokio::test]
    async fn fetch_failure_fails_the_cycle() {
        let mut indexer = MockIndexerPort::new();
        indexer.expect_get_orders().returning(|_, _, _| {
            Err(IndexerError::Status {
                status: 400,
                body: "bad address".into(),
            })
        });
        let result = service(indexer, Arc::new(InMemoryOrderRepository::new()))
            .sync_once(&CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ServiceError::Indexer(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop() {
        let svc = Arc::new(service(indexer_returning(Vec::new()), Arc::new(InMemoryOrderRepository::new())));
        svc.start(&CancellationToken::new()).unwrap();
        assert!(svc.is_running());
        assert!(matches!(
            svc.start(&CancellationToken::new()),
            Err(ServiceError::AlreadyRunning { .. })
        ));
        svc.stop().await;
        assert!(!svc.is_running());
    }
}
