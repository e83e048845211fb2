//! Market Metadata Cache
//!
//! TTL cache of per-market quantization parameters. The whole market table
//! is refreshed at once so quantization never mixes entries from different
//! fetches.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{IndexerPort, MarketConfig};
use crate::domain::market::{
    DEFAULT_QUANTUM_CONVERSION_EXPONENT, MarketError, MarketMetadata, fallback_markets,
    quantize_price, quantize_size,
};
use crate::resilience::ResilientExecutor;

/// Default time an indexer snapshot stays valid.
pub const DEFAULT_MARKET_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Default)]
struct CacheState {
    markets: HashMap<String, Arc<MarketMetadata>>,
    last_update: Option<Instant>,
}

/// Shared, read-mostly market metadata cache.
pub struct MarketCache {
    indexer: Arc<dyn IndexerPort>,
    executor: ResilientExecutor,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl std::fmt::Debug for MarketCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MarketCache")
            .field("ttl", &self.ttl)
            .field("markets", &state.markets.len())
            .field("last_update", &state.last_update)
            .finish_non_exhaustive()
    }
}

impl MarketCache {
    /// Create an empty cache; the first lookup triggers a fetch.
    #[must_use]
    pub fn new(indexer: Arc<dyn IndexerPort>, executor: ResilientExecutor, ttl: Duration) -> Self {
        Self {
            indexer,
            executor,
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Metadata for `market`, refreshing the whole table if the TTL elapsed.
    ///
    /// An unknown market is a permanent error and does not trigger a refetch
    /// while the cache is valid.
    pub async fn get_market(
        &self,
        market: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<MarketMetadata>, MarketError> {
        {
            let state = self.state.read();
            if self.is_valid(&state) {
                tracing::trace!(market, "Market served from cache");
                return state
                    .markets
                    .get(market)
                    .cloned()
                    .ok_or_else(|| MarketError::NotFound {
                        market: market.to_string(),
                    });
            }
        }

        if let Err(e) = self.refresh(cancel).await {
            if let Some(stale) = self.state.read().markets.get(market).cloned() {
                tracing::warn!(market, error = %e, "Market refresh failed, serving stale entry");
                return Ok(stale);
            }
            return Err(e);
        }

        self.state
            .read()
            .markets
            .get(market)
            .cloned()
            .ok_or_else(|| MarketError::NotFound {
                market: market.to_string(),
            })
    }

    /// All markets, refreshing first if the TTL elapsed.
    pub async fn get_all_markets(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Arc<MarketMetadata>>, MarketError> {
        if !self.is_cache_valid() {
            self.refresh(cancel).await?;
        }
        Ok(self.cached_markets())
    }

    /// Fetch every market from the indexer and replace the cache.
    ///
    /// If the fetch fails while the cache is empty, the static fallback table
    /// is installed instead and the call succeeds. Returns the number of
    /// cached markets.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<usize, MarketError> {
        let fetched = self
            .executor
            .execute(cancel, || self.indexer.get_markets())
            .await;

        let configs = match fetched {
            Ok(configs) => configs,
            Err(e) => {
                let mut state = self.state.write();
                if state.markets.is_empty() {
                    tracing::warn!(error = %e, "Market fetch failed, installing fallback markets");
                    state.markets = fallback_markets()
                        .into_iter()
                        .map(|(k, v)| (k, Arc::new(v)))
                        .collect();
                    state.last_update = Some(Instant::now());
                    return Ok(state.markets.len());
                }
                return Err(MarketError::Fetch {
                    message: e.to_string(),
                });
            }
        };

        let markets: HashMap<String, Arc<MarketMetadata>> = configs
            .iter()
            .filter_map(|(ticker, config)| match metadata_from_config(ticker, config) {
                Ok(metadata) => Some((ticker.clone(), Arc::new(metadata))),
                Err(e) => {
                    tracing::debug!(market = %ticker, error = %e, "Skipping market");
                    None
                }
            })
            .collect();

        let count = markets.len();
        {
            let mut state = self.state.write();
            state.markets = markets;
            state.last_update = Some(Instant::now());
        }
        tracing::info!(market_count = count, "Market cache refreshed");
        Ok(count)
    }

    /// Drop every entry; the next lookup refetches.
    pub fn clear_cache(&self) {
        let mut state = self.state.write();
        state.markets.clear();
        state.last_update = None;
        tracing::debug!("Market cache cleared");
    }

    /// Snapshot of the cached entries.
    #[must_use]
    pub fn cached_markets(&self) -> HashMap<String, Arc<MarketMetadata>> {
        self.state.read().markets.clone()
    }

    /// Returns true if the last refresh is younger than the TTL.
    #[must_use]
    pub fn is_cache_valid(&self) -> bool {
        self.is_valid(&self.state.read())
    }

    /// Time since the last refresh, if any.
    #[must_use]
    pub fn cache_age(&self) -> Option<Duration> {
        self.state.read().last_update.map(|t| t.elapsed())
    }

    fn is_valid(&self, state: &CacheState) -> bool {
        state.last_update.is_some_and(|t| t.elapsed() < self.ttl)
    }
}

/// Derive quantization parameters from an indexer market config.
///
/// Protocol fields missing from the config are taken from the fallback table
/// or computed from the human step and tick sizes.
pub fn metadata_from_config(
    ticker: &str,
    config: &MarketConfig,
) -> Result<MarketMetadata, MarketError> {
    let fallback = fallback_markets().remove(ticker);
    let invalid = |message: String| MarketError::Fetch {
        message: format!("{ticker}: {message}"),
    };

    let id = match (&config.clob_pair_id, &fallback) {
        (Some(raw), _) => raw
            .parse::<u32>()
            .map_err(|e| invalid(format!("invalid clobPairId '{raw}': {e}")))?,
        (None, Some(f)) => f.id,
        (None, None) => return Err(invalid("missing clobPairId".to_string())),
    };
    let atomic_resolution = config
        .atomic_resolution
        .or_else(|| fallback.as_ref().map(|f| f.atomic_resolution))
        .ok_or_else(|| invalid("missing atomicResolution".to_string()))?;
    let quantum_conversion_exponent = config
        .quantum_conversion_exponent
        .unwrap_or(DEFAULT_QUANTUM_CONVERSION_EXPONENT);

    let step_base_quantums = match config.step_base_quantums {
        Some(step) => step,
        None => quantize_size(config.step_size, atomic_resolution)
            .map_err(|e| invalid(e.to_string()))?,
    };

    let mut metadata = MarketMetadata {
        id,
        pair: ticker.to_string(),
        atomic_resolution,
        quantum_conversion_exponent,
        subticks_per_tick: 0,
        step_base_quantums,
        min_price_change: config.tick_size,
        step_size: config.step_size,
        oracle_price: config.oracle_price,
        cache_time: Utc::now(),
    };
    metadata.subticks_per_tick = match config.subticks_per_tick {
        Some(subticks) => subticks,
        None => quantize_price(config.tick_size, metadata.subticks_exponent())
            .ok()
            .and_then(|s| u32::try_from(s).ok())
            .or_else(|| fallback.as_ref().map(|f| f.subticks_per_tick))
            .ok_or_else(|| invalid("cannot derive subticksPerTick".to_string()))?,
    };
    Ok(metadata)
}
