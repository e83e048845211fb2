//! Position Sync Service
//!
//! Keeps an in-memory snapshot of the tracked address's positions. Each
//! successful fetch replaces the snapshot wholesale; a failed fetch keeps the
//! previous one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::worker::{BackgroundLoop, ServiceError};
use crate::application::ports::{IndexerPort, Position};
use crate::observability::record_sync_cycle;
use crate::resilience::ResilientExecutor;

/// Default poll interval.
pub const DEFAULT_POSITION_SYNC_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct Snapshot {
    positions: HashMap<String, Position>,
    synced_at: Option<(DateTime<Utc>, tokio::time::Instant)>,
}

/// Background position synchronization.
pub struct PositionSyncService {
    indexer: Arc<dyn IndexerPort>,
    executor: ResilientExecutor,
    address: String,
    interval: Duration,
    snapshot: RwLock<Snapshot>,
    worker: BackgroundLoop,
}

impl std::fmt::Debug for PositionSyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionSyncService")
            .field("address", &self.address)
            .field("interval", &self.interval)
            .field("positions", &self.snapshot.read().positions.len())
            .finish_non_exhaustive()
    }
}

impl PositionSyncService {
    /// Create a stopped service with an empty snapshot.
    #[must_use]
    pub fn new(
        indexer: Arc<dyn IndexerPort>,
        executor: ResilientExecutor,
        address: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            indexer,
            executor,
            address: address.into(),
            interval,
            snapshot: RwLock::new(Snapshot::default()),
            worker: BackgroundLoop::new("position-sync"),
        }
    }

    /// Fetch positions and replace the snapshot. Returns the position count.
    pub async fn sync_once(&self, cancel: &CancellationToken) -> Result<usize, ServiceError> {
        let result = self
            .executor
            .execute(cancel, || self.indexer.get_positions(&self.address))
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(address = %self.address, error = %e, "Position fetch failed, keeping previous snapshot");
                record_sync_cycle("positions", false, 0);
                return Err(e.into());
            }
        };

        let positions: HashMap<String, Position> = response
            .positions
            .into_iter()
            .map(|p| (p.market.clone(), p))
            .collect();
        let count = positions.len();

        *self.snapshot.write() = Snapshot {
            positions,
            synced_at: Some((Utc::now(), tokio::time::Instant::now())),
        };

        debug!(address = %self.address, positions = count, "Position sync cycle complete");
        record_sync_cycle("positions", true, count);
        Ok(count)
    }

    /// All cached positions.
    #[must_use]
    pub fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> =
            self.snapshot.read().positions.values().cloned().collect();
        positions.sort_by(|a, b| a.market.cmp(&b.market));
        positions
    }

    /// The cached position for `market`.
    #[must_use]
    pub fn position(&self, market: &str) -> Option<Position> {
        self.snapshot.read().positions.get(market).cloned()
    }

    /// Sum of unrealized PnL across cached positions.
    #[must_use]
    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.snapshot
            .read()
            .positions
            .values()
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    /// Sum of realized PnL across cached positions.
    #[must_use]
    pub fn total_realized_pnl(&self) -> Decimal {
        self.snapshot
            .read()
            .positions
            .values()
            .map(|p| p.realized_pnl)
            .sum()
    }

    /// Returns true if the last successful sync is younger than `ttl`.
    #[must_use]
    pub fn is_cache_valid(&self, ttl: Duration) -> bool {
        self.snapshot
            .read()
            .synced_at
            .is_some_and(|(_, at)| at.elapsed() < ttl)
    }

    /// Wall-clock time of the last successful sync.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().synced_at.map(|(at, _)| at)
    }

    /// Start the periodic loop; the first cycle runs immediately.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> Result<(), ServiceError> {
        let service = Arc::clone(self);
        self.worker.start(parent, self.interval, move |cancel| {
            let service = Arc::clone(&service);
            async move {
                // Failures are logged inside sync_once.
                let _ = service.sync_once(&cancel).await;
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
    use std::sync::atomic::{AtomicU32, Ordering};

    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{IndexerError, MockIndexerPort, PositionsResponse};
    use crate::application::services::test_support::resilient_executor;

    fn position(market: &str, side: &str, size: &str, unrealized: &str, realized: &str) -> Position {
        serde_json::from_value(serde_json::json!({
            "market": market,
            "status": "OPEN",
            "side": side,
            "size": size,
            "maxSize": size,
            "entryPrice": "100",
            "realizedPnl": realized,
            "unrealizedPnl": unrealized,
            "createdAt": "2024-01-01T00:00:00Z",
            "createdAtHeight": "1",
            "sumOpen": size,
            "sumClose": "0",
            "netFunding": "0",
        }))
        .unwrap()
    }

    fn service(indexer: MockIndexerPort) -> PositionSyncService {
        PositionSyncService::new(
            Arc::new(indexer),
            resilient_executor("indexer-queries"),
            "dydx1test",
            DEFAULT_POSITION_SYNC_INTERVAL,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_replaced_and_kept_on_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut indexer = MockIndexerPort::new();
        indexer.expect_get_positions().returning(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(PositionsResponse {
                    positions: vec![
                        position("BTC-USD", "LONG", "0.5", "120.5", "10"),
                        position("ETH-USD", "SHORT", "-2", "-20.5", "5"),
                    ],
                }),
                1 => Ok(PositionsResponse {
                    positions: vec![position("SOL-USD", "LONG", "10", "1", "0")],
                }),
                _ => Err(IndexerError::Status {
                    status: 404,
                    body: "not found".into(),
                }),
            }
        });
        let svc = service(indexer);
        let cancel = CancellationToken::new();

        assert!(!svc.is_cache_valid(Duration::from_secs(60)));
        assert_eq!(svc.sync_once(&cancel).await.unwrap(), 2);
        assert_eq!(svc.total_unrealized_pnl(), dec!(100));
        assert_eq!(svc.total_realized_pnl(), dec!(15));
        assert_eq!(svc.positions()[0].market, "BTC-USD");
        assert!(svc.is_cache_valid(Duration::from_secs(60)));

        assert_eq!(svc.sync_once(&cancel).await.unwrap(), 1);
        assert!(svc.position("BTC-USD").is_none());
        assert!(svc.position("SOL-USD").is_some());
        let synced = svc.last_sync_time();

        assert!(svc.sync_once(&cancel).await.is_err());
        assert!(svc.position("SOL-USD").is_some());
        assert_eq!(svc.last_sync_time(), synced);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!svc.is_cache_valid(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_fetches_immediately() {
        let mut indexer = MockIndexerPort::new();
        indexer.expect_get_positions().returning(|_| {
            Ok(PositionsResponse {
                positions: vec![position("BTC-USD", "LONG", "1", "0", "0")],
            })
        });
        let svc = Arc::new(service(indexer));
        svc.start(&CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(svc.position("BTC-USD").is_some());
        svc.stop().await;
        assert!(!svc.is_running());
    }
}
