//! Fixtures shared by the service tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::market_cache::{DEFAULT_MARKET_CACHE_TTL, MarketCache};
use crate::application::ports::{IndexerOrder, MarketConfig, MockIndexerPort};
use crate::domain::market::generate_client_order_id;
use crate::domain::order::{NewOrder, Order, OrderSide, OrderType, TimeInForce};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, ResilientExecutor, RetryPolicy};

pub fn market_configs() -> HashMap<String, MarketConfig> {
    let config = |ticker: &str, step: &str, tick: &str, oracle: &str| -> MarketConfig {
        serde_json::from_value(serde_json::json!({
            "ticker": ticker,
            "status": "ACTIVE",
            "stepSize": step,
            "tickSize": tick,
            "oraclePrice": oracle,
        }))
        .unwrap()
    };
    HashMap::from([
        ("BTC-USD".to_string(), config("BTC-USD", "0.01", "1", "65000")),
        ("ETH-USD".to_string(), config("ETH-USD", "1", "0.1", "3000")),
    ])
}

pub fn resilient_executor(name: &str) -> ResilientExecutor {
    let breaker = Arc::new(CircuitBreaker::new(name, CircuitBreakerConfig::default()));
    let retry = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100), 2.0, false);
    ResilientExecutor::new(breaker, retry)
}

pub fn market_cache() -> Arc<MarketCache> {
    let mut indexer = MockIndexerPort::new();
    indexer
        .expect_get_markets()
        .returning(|| Ok(market_configs()));
    Arc::new(MarketCache::new(
        Arc::new(indexer),
        resilient_executor("indexer-queries"),
        DEFAULT_MARKET_CACHE_TTL,
    ))
}

/// A BTC-USD buy for 0.5.
pub fn order(order_type: OrderType, price: Option<Decimal>) -> Order {
    Order::new(NewOrder {
        client_id: generate_client_order_id().to_string(),
        market: "BTC-USD".to_string(),
        side: OrderSide::Buy,
        order_type,
        size: dec!(0.5),
        price,
        time_in_force: TimeInForce::Gtt,
        good_til_block: None,
        good_til_block_time: None,
    })
    .unwrap()
}

pub fn remote_order(
    id: &str,
    client_id: &str,
    status: &str,
    size: Decimal,
    remaining: Decimal,
) -> IndexerOrder {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "clientId": client_id,
        "ticker": "BTC-USD",
        "side": "BUY",
        "size": size.to_string(),
        "remainingSize": remaining.to_string(),
        "price": "50000",
        "type": "LIMIT",
        "status": status,
        "timeInForce": "GTT",
    }))
    .unwrap()
}
