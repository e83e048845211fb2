//! Order Router Use Case
//!
//! The six operations exposed to the transport layer: place, cancel, order
//! status, order history, positions and close-position.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::RouterError;
use crate::application::ports::{IndexerPort, Position, SignerPort};
use crate::application::services::TxBuilder;
use crate::domain::market::generate_client_order_id;
use crate::domain::order::{
    DEFAULT_LIST_LIMIT, NewOrder, Order, OrderFilters, OrderRepository, OrderSide,
    OrderStatusHistory, OrderType, TimeInForce,
};
use crate::resilience::ResilientExecutor;

/// Parameters of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Caller-chosen client id; generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Market ticker.
    pub market: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Size in base asset units.
    pub size: Decimal,
    /// Limit price; required for limit-family orders, rejected otherwise.
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Time in force (defaults to GTT).
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Block until which the order is valid.
    #[serde(default)]
    pub good_til_block: Option<u32>,
    /// Time until which the order is valid.
    #[serde(default)]
    pub good_til_block_time: Option<DateTime<Utc>>,
    /// Only reduce an existing position.
    #[serde(default)]
    pub reduce_only: bool,
}

/// Which order to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    /// Internal ledger id.
    Id(Uuid),
    /// Client order id.
    ClientId(String),
}

impl CancelTarget {
    /// Build a target from optional transport fields; the ledger id wins.
    pub fn from_parts(order_id: Option<&str>, client_id: Option<&str>) -> Result<Self, RouterError> {
        match (order_id, client_id) {
            (Some(id), _) => Uuid::parse_str(id).map(Self::Id).map_err(|e| {
                RouterError::validation("order_id", format!("invalid order ID format: {e}"))
            }),
            (None, Some(client_id)) => Ok(Self::ClientId(client_id.to_string())),
            (None, None) => Err(RouterError::validation(
                "order_id",
                "either order_id or client_id must be provided",
            )),
        }
    }
}

/// An order with its status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatusView {
    /// Current ledger row.
    pub order: Order,
    /// Status transitions, oldest first.
    pub history: Vec<OrderStatusHistory>,
}

/// Caller-facing order operations.
pub struct OrderRouter {
    repository: Arc<dyn OrderRepository>,
    tx_builder: Arc<TxBuilder>,
    signer: Arc<dyn SignerPort>,
    indexer: Arc<dyn IndexerPort>,
    indexer_executor: ResilientExecutor,
}

impl std::fmt::Debug for OrderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRouter")
            .field("tx_builder", &self.tx_builder)
            .finish_non_exhaustive()
    }
}

impl OrderRouter {
    /// Wire the router.
    #[must_use]
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        tx_builder: Arc<TxBuilder>,
        signer: Arc<dyn SignerPort>,
        indexer: Arc<dyn IndexerPort>,
        indexer_executor: ResilientExecutor,
    ) -> Self {
        Self {
            repository,
            tx_builder,
            signer,
            indexer,
            indexer_executor,
        }
    }

    /// Persist a `PENDING` order and run it through the transaction pipeline.
    ///
    /// Returns the ledger row after the attempt. A pipeline failure leaves
    /// the row `REJECTED` and is returned as the error.
    pub async fn place_order(
        &self,
        request: PlaceOrderRequest,
        cancel: &CancellationToken,
    ) -> Result<Order, RouterError> {
        let client_id = request
            .client_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| generate_client_order_id().to_string());

        let mut order = Order::new(NewOrder {
            client_id,
            market: request.market,
            side: request.side,
            order_type: request.order_type,
            size: request.size,
            price: request.price,
            time_in_force: request.time_in_force,
            good_til_block: request.good_til_block,
            good_til_block_time: request.good_til_block_time,
        })?;
        self.repository.create_order(&order).await?;

        tracing::info!(
            order_id = %order.id,
            client_id = %order.client_id,
            market = %order.market,
            side = %order.side,
            order_type = %order.order_type,
            size = %order.size,
            "Placing order"
        );

        self.tx_builder
            .place_order(&mut order, request.reduce_only, cancel)
            .await?;
        Ok(order)
    }

    /// Cancel an `OPEN` or `PARTIALLY_FILLED` order.
    pub async fn cancel_order(
        &self,
        target: CancelTarget,
        cancel: &CancellationToken,
    ) -> Result<Order, RouterError> {
        let mut order = match &target {
            CancelTarget::Id(id) => self.repository.get_order_by_id(*id).await?,
            CancelTarget::ClientId(client_id) => {
                self.repository.get_order_by_client_id(client_id).await?
            }
        };

        tracing::info!(order_id = %order.id, status = %order.status, "Cancelling order");
        self.tx_builder.cancel_order(&mut order, cancel).await?;
        Ok(order)
    }

    /// An order and its history. A failed history read yields an empty history.
    pub async fn get_order_status(&self, id: Uuid) -> Result<OrderStatusView, RouterError> {
        let order = self.repository.get_order_by_id(id).await?;
        let history = match self.repository.get_order_history(id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(order_id = %id, error = %e, "Failed to get order history");
                Vec::new()
            }
        };
        Ok(OrderStatusView { order, history })
    }

    /// Orders matching `filters`, newest first; the page size defaults to 50.
    pub async fn get_order_history(
        &self,
        mut filters: OrderFilters,
    ) -> Result<Vec<Order>, RouterError> {
        if filters.limit.is_none_or(|limit| limit == 0) {
            filters.limit = Some(DEFAULT_LIST_LIMIT);
        }
        let orders = self.repository.list_orders(&filters).await?;
        tracing::debug!(count = orders.len(), "Retrieved order history");
        Ok(orders)
    }

    /// Positions of the signer's subaccount, read from the indexer.
    pub async fn get_positions(&self, cancel: &CancellationToken) -> Result<Vec<Position>, RouterError> {
        let address = self.signer.address().await?;
        let response = self
            .indexer_executor
            .execute(cancel, || self.indexer.get_positions(&address))
            .await?;
        tracing::debug!(count = response.positions.len(), "Retrieved positions");
        Ok(response.positions)
    }

    /// Close the position in `market` with a reduce-only market order.
    pub async fn close_position(
        &self,
        market: &str,
        cancel: &CancellationToken,
    ) -> Result<Order, RouterError> {
        let position = self
            .get_positions(cancel)
            .await?
            .into_iter()
            .find(|p| p.market == market && !p.size.is_zero())
            .ok_or_else(|| RouterError::PositionNotFound {
                market: market.to_string(),
            })?;

        tracing::info!(
            market,
            side = ?position.side,
            size = %position.size,
            "Closing position"
        );

        self.place_order(
            PlaceOrderRequest {
                client_id: None,
                market: market.to_string(),
                side: position.side.closing_side(),
                order_type: OrderType::Market,
                size: position.size.abs(),
                price: None,
                time_in_force: TimeInForce::Ioc,
                good_til_block: None,
                good_til_block_time: None,
                reduce_only: true,
            },
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::{
        MockChainPort, MockIndexerPort, MockSignerPort, PositionsResponse, TxResponse,
    };
    use crate::application::services::TxBuilderConfig;
    use crate::application::use_cases::ErrorCode;
    use crate::domain::order::OrderStatus;
    use crate::infrastructure::persistence::InMemoryOrderRepository;
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};

    fn executor(name: &str) -> ResilientExecutor {
        ResilientExecutor::new(
            Arc::new(CircuitBreaker::new(name, CircuitBreakerConfig::default())),
            RetryPolicy::http().without_jitter(),
        )
    }

    fn signer() -> Arc<MockSignerPort> {
        let mut signer = MockSignerPort::new();
        signer
            .expect_address()
            .returning(|| Ok("dydx1sender".to_string()));
        signer
            .expect_sign_bytes()
            .returning(|payload| Ok(payload[..8].to_vec()));
        Arc::new(signer)
    }

    fn indexer() -> MockIndexerPort {
        let mut indexer = MockIndexerPort::new();
        indexer.expect_get_markets().returning(|| {
            Ok(std::collections::HashMap::from([(
                "BTC-USD".to_string(),
                serde_json::from_value(serde_json::json!({
                    "ticker": "BTC-USD", "status": "ACTIVE", "stepSize": "0.0001",
                    "tickSize": "1", "oraclePrice": "60000",
                }))
                .unwrap(),
            )]))
        });
        indexer.expect_get_positions().returning(|_| {
            Ok(serde_json::from_value::<PositionsResponse>(serde_json::json!({
                "positions": [{
                    "market": "BTC-USD", "side": "SHORT", "size": "-0.25",
                    "entryPrice": "61000", "createdAt": "2025-01-01T00:00:00Z", "status": "OPEN"
                }]
            }))
            .unwrap())
        });
        indexer
    }

    fn chain_confirming() -> MockChainPort {
        let mut chain = MockChainPort::new();
        chain.expect_broadcast_and_wait().returning(|_, _| {
            Ok(TxResponse {
                tx_hash: "FEED".to_string(),
                code: 0,
                raw_log: String::new(),
                gas_used: 90_000,
                gas_wanted: 300_000,
                height: 77,
                timestamp: Utc::now(),
            })
        });
        chain
    }

    fn router(chain: MockChainPort, repo: Arc<InMemoryOrderRepository>) -> OrderRouter {
        let indexer: Arc<dyn IndexerPort> = Arc::new(indexer());
        let markets = Arc::new(crate::application::services::MarketCache::new(
            Arc::clone(&indexer),
            executor("indexer-queries"),
            crate::application::services::DEFAULT_MARKET_CACHE_TTL,
        ));
        let signer = signer();
        let tx_builder = TxBuilder::new(
            markets,
            signer.clone(),
            Arc::new(chain),
            repo.clone(),
            executor("chain-transactions"),
            TxBuilderConfig::default(),
        )
        .unwrap();
        OrderRouter::new(repo, Arc::new(tx_builder), signer, indexer, executor("indexer-queries"))
    }

    fn limit_request() -> PlaceOrderRequest {
        PlaceOrderRequest {
            client_id: None,
            market: "BTC-USD".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            size: dec!(0.01),
            price: Some(dec!(59000)),
            time_in_force: TimeInForce::Gtt,
            good_til_block: None,
            good_til_block_time: None,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn place_then_status_shows_history() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let router = router(chain_confirming(), repo);
        let cancel = CancellationToken::new();

        let placed = router.place_order(limit_request(), &cancel).await.unwrap();
        assert_eq!(placed.status, OrderStatus::Open);
        assert_eq!(placed.tx_hash.as_deref(), Some("FEED"));
        assert!(!placed.client_id.is_empty());

        let view = router.get_order_status(placed.id).await.unwrap();
        let transitions: Vec<_> = view.history.iter().map(|h| h.new_status).collect();
        assert_eq!(transitions, vec![OrderStatus::Pending, OrderStatus::Open]);
    }

    #[tokio::test]
    async fn invalid_request_is_not_persisted() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let router = router(MockChainPort::new(), Arc::clone(&repo));

        let mut request = limit_request();
        request.price = None;
        let err = router
            .place_order(request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn cancel_of_terminal_order_makes_no_network_call() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let mut order = Order::new(NewOrder {
            client_id: "77".into(),
            market: "BTC-USD".into(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            size: dec!(1),
            price: Some(dec!(70000)),
            time_in_force: TimeInForce::Gtt,
            good_til_block: None,
            good_til_block_time: None,
        })
        .unwrap();
        order.apply_fill(dec!(1)).unwrap();
        order.set_status(OrderStatus::Filled);
        repo.create_order(&order).await.unwrap();

        // MockChainPort without expectations panics if called.
        let router = router(MockChainPort::new(), repo);
        let err = router
            .cancel_order(CancelTarget::ClientId("77".into()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidOrderState);
    }

    #[tokio::test]
    async fn close_short_position_buys_back_absolute_size() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let router = router(chain_confirming(), repo);
        let cancel = CancellationToken::new();

        let order = router.close_position("BTC-USD", &cancel).await.unwrap();
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.size, dec!(0.25));
        assert!(order.price.is_none());

        let err = router.close_position("ETH-USD", &cancel).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PositionNotFound);
    }

    #[tokio::test]
    async fn history_defaults_to_fifty() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let router = router(MockChainPort::new(), Arc::clone(&repo));
        for i in 0..60 {
            let order = Order::new(NewOrder {
                client_id: format!("c-{i}"),
                market: "BTC-USD".into(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                size: dec!(1),
                price: Some(dec!(1)),
                time_in_force: TimeInForce::Gtt,
                good_til_block: None,
                good_til_block_time: None,
            })
            .unwrap();
            repo.create_order(&order).await.unwrap();
        }
        let orders = router.get_order_history(OrderFilters::default()).await.unwrap();
        assert_eq!(orders.len(), 50);
    }

    #[test]
    fn cancel_target_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(
            CancelTarget::from_parts(Some(&id.to_string()), Some("x")).unwrap(),
            CancelTarget::Id(id)
        );
        assert_eq!(
            CancelTarget::from_parts(None, Some("abc")).unwrap(),
            CancelTarget::ClientId("abc".into())
        );
        assert_eq!(
            CancelTarget::from_parts(Some("not-a-uuid"), None)
                .unwrap_err()
                .code(),
            ErrorCode::ValidationError
        );
        assert!(CancelTarget::from_parts(None, None).is_err());
    }
}
