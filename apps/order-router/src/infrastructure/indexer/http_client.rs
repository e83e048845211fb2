//! Indexer HTTP client.
//!
//! One request per call: retries and breaking are applied by the caller
//! through the resilience layer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{
    IndexerError, IndexerOrder, IndexerPort, MarketConfig, MarketsResponse, OrdersResponse,
    PositionsResponse,
};

/// Default request timeout.
pub const DEFAULT_INDEXER_TIMEOUT: Duration = Duration::from_secs(30);

/// `/orders` is served either as a bare array or wrapped in `{"orders": []}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrdersBody {
    List(Vec<IndexerOrder>),
    Wrapped(OrdersResponse),
}

/// HTTP client for the indexer API.
#[derive(Debug, Clone)]
pub struct IndexerHttpClient {
    client: Client,
    base_url: String,
}

impl IndexerHttpClient {
    /// Create a client for `base_url` (e.g. `https://indexer.dydx.trade/v4`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IndexerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Http {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, IndexerError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(url = %url, "Indexer request");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| IndexerError::Http {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| IndexerError::Http {
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(IndexerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| IndexerError::Decode {
            message: format!("{path}: {e}"),
        })
    }
}

#[async_trait]
impl IndexerPort for IndexerHttpClient {
    async fn get_positions(&self, address: &str) -> Result<PositionsResponse, IndexerError> {
        let response: PositionsResponse = self
            .get(&format!("/addresses/{address}/subaccountNumber/0"), &[])
            .await?;
        tracing::debug!(address, count = response.positions.len(), "Fetched positions");
        Ok(response)
    }

    async fn get_orders(
        &self,
        address: &str,
        status: Option<String>,
        market: Option<String>,
    ) -> Result<OrdersResponse, IndexerError> {
        let mut query = vec![("address", address), ("subaccountNumber", "0")];
        if let Some(status) = status.as_deref() {
            query.push(("status", status));
        }
        if let Some(market) = market.as_deref() {
            query.push(("market", market));
        }

        let orders = match self.get::<OrdersBody>("/orders", &query).await? {
            OrdersBody::List(orders) => orders,
            OrdersBody::Wrapped(response) => response.orders,
        };
        tracing::debug!(address, count = orders.len(), "Fetched orders");
        Ok(OrdersResponse { orders })
    }

    async fn get_order(&self, order_id: &str) -> Result<IndexerOrder, IndexerError> {
        match self.get(&format!("/orders/{order_id}"), &[]).await {
            Err(IndexerError::Status { status: 404, .. }) => Err(IndexerError::NotFound {
                entity: "order",
                id: order_id.to_string(),
            }),
            other => other,
        }
    }

    async fn get_markets(&self) -> Result<HashMap<String, MarketConfig>, IndexerError> {
        let response: MarketsResponse = self.get("/perpetualMarkets", &[]).await?;
        tracing::debug!(count = response.markets.len(), "Fetched markets");
        Ok(response.markets)
    }

    async fn get_market_config(&self, market: &str) -> Result<MarketConfig, IndexerError> {
        self.get_markets()
            .await?
            .remove(market)
            .ok_or_else(|| IndexerError::NotFound {
                entity: "market",
                id: market.to_string(),
            })
    }
}
