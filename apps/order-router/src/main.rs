//! Order Router Binary
//!
//! Wires the adapters, starts the background sync and reconciliation loops,
//! and runs until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-router
//! ```
//!
//! # Environment Variables
//!
//! - `ORDER_ROUTER_CONFIG`: config file path (default: `config.yaml` if present,
//!   otherwise built-in defaults)
//! - `RUST_LOG`: log filter override

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use order_router::application::ports::{ChainPort, IndexerPort, SignerPort};
use order_router::application::services::{
    MarketCache, OrderSyncConfig, OrderSyncService, PositionSyncService, Reconciler,
    ReconcilerConfig, TxBuilder,
};
use order_router::application::use_cases::OrderRouter;
use order_router::config::{Config, DEFAULT_CONFIG_PATH, load_config, load_config_from_string};
use order_router::domain::order::OrderRepository;
use order_router::infrastructure::chain::Broadcaster;
use order_router::infrastructure::indexer::IndexerHttpClient;
use order_router::infrastructure::persistence::TursoOrderRepository;
use order_router::infrastructure::signer::RemoteSigner;
use order_router::observability::init_metrics;
use order_router::resilience::{CircuitBreakerManager, INDEXER_QUERIES, ResilientExecutor};
use tokio_util::sync::CancellationToken;

/// Upper bound on waiting for the loops to stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Running background services.
struct Services {
    order_sync: Arc<OrderSyncService>,
    position_sync: Arc<PositionSyncService>,
    reconciler: Arc<Reconciler>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let config = read_config()?;
    init_tracing(&config.observability.log_level);

    tracing::info!(
        chain_id = %config.chain.chain_id,
        rpc_url = %config.chain.rpc_url,
        indexer = %config.indexer.base_url,
        database = %config.database.path,
        "Starting order router"
    );

    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_config()?)?;
    }

    let breakers = Arc::new(CircuitBreakerManager::new(
        config.resilience.circuit_breaker.to_resilience_config(),
    ));
    let http_retry = config.resilience.retry.http.to_policy();
    let chain_executor = ResilientExecutor::new(breakers.chain_breaker(), http_retry.clone());
    let indexer_executor =
        ResilientExecutor::new(breakers.get_or_create(INDEXER_QUERIES), http_retry);

    let indexer: Arc<dyn IndexerPort> = Arc::new(IndexerHttpClient::new(
        config.indexer.base_url.clone(),
        config.indexer.timeout(),
    )?);
    let mut broadcaster =
        Broadcaster::new(config.chain.rpc_url.clone(), config.chain.confirmation_timeout())?;
    broadcaster.set_poll_interval(config.chain.poll_interval());
    let chain: Arc<dyn ChainPort> = Arc::new(broadcaster);
    let signer: Arc<dyn SignerPort> = Arc::new(RemoteSigner::new(
        config.signer.url.clone(),
        config.signer.timeout(),
    )?);
    let repository: Arc<dyn OrderRepository> = Arc::new(
        TursoOrderRepository::open(&config.database.path)
            .await
            .with_context(|| format!("opening order ledger at {}", config.database.path))?,
    );

    let markets = Arc::new(MarketCache::new(
        Arc::clone(&indexer),
        indexer_executor.clone(),
        config.indexer.market_cache_ttl(),
    ));
    let tx_builder = Arc::new(TxBuilder::new(
        markets,
        Arc::clone(&signer),
        chain,
        Arc::clone(&repository),
        chain_executor,
        config.chain.tx_builder_config(),
    )?);
    let router = OrderRouter::new(
        Arc::clone(&repository),
        tx_builder,
        Arc::clone(&signer),
        Arc::clone(&indexer),
        indexer_executor.clone(),
    );

    let shutdown = CancellationToken::new();
    let address = tracked_address(&config, signer.as_ref()).await?;

    match router.get_positions(&shutdown).await {
        Ok(positions) => tracing::info!(%address, positions = positions.len(), "Indexer reachable"),
        Err(e) => tracing::warn!(%address, error = %e, "Initial position fetch failed"),
    }

    let services = if config.sync.enabled {
        Some(start_services(
            &config,
            &address,
            &indexer,
            &repository,
            &indexer_executor,
            &shutdown,
        )?)
    } else {
        tracing::info!("Background sync disabled");
        None
    };

    tracing::info!("Order router ready");
    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    if let Some(services) = services {
        stop_services(services).await;
    }
    drop(router);

    for (name, state) in breakers.all() {
        tracing::debug!(name, ?state, "Circuit breaker final state");
    }
    tracing::info!("Order router stopped");
    Ok(())
}

/// Load `.env` from the working directory or the nearest ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

fn read_config() -> anyhow::Result<Config> {
    let path = std::env::var("ORDER_ROUTER_CONFIG").ok();
    let config = match path.as_deref() {
        Some(path) => load_config(Some(path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(None)?,
        None => load_config_from_string("")?,
    };
    Ok(config)
}

/// Initialize the tracing subscriber; `RUST_LOG` directives win.
fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("order_router={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn tracked_address(config: &Config, signer: &dyn SignerPort) -> anyhow::Result<String> {
    if !config.sync.address.is_empty() {
        return Ok(config.sync.address.clone());
    }
    signer
        .address()
        .await
        .context("resolving address from signer (set sync.address to skip)")
}

fn start_services(
    config: &Config,
    address: &str,
    indexer: &Arc<dyn IndexerPort>,
    repository: &Arc<dyn OrderRepository>,
    executor: &ResilientExecutor,
    shutdown: &CancellationToken,
) -> anyhow::Result<Services> {
    let order_sync = Arc::new(OrderSyncService::new(
        Arc::clone(indexer),
        Arc::clone(repository),
        executor.clone(),
        OrderSyncConfig {
            address: address.to_string(),
            interval: config.sync.order_interval(),
            batch_limit: config.sync.batch_limit,
        },
    ));
    let position_sync = Arc::new(PositionSyncService::new(
        Arc::clone(indexer),
        executor.clone(),
        address,
        config.sync.position_interval(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(indexer),
        Arc::clone(repository),
        executor.clone(),
        ReconcilerConfig {
            address: address.to_string(),
            interval: config.sync.reconcile_interval(),
        },
    ));

    order_sync.start(shutdown)?;
    position_sync.start(shutdown)?;
    reconciler.start(shutdown)?;
    tracing::info!(
        address,
        order_interval_secs = config.sync.order_interval_secs,
        position_interval_secs = config.sync.position_interval_secs,
        reconcile_interval_secs = config.sync.reconcile_interval_secs,
        "Background services started"
    );

    Ok(Services {
        order_sync,
        position_sync,
        reconciler,
    })
}

async fn stop_services(services: Services) {
    let stop_all = async {
        tokio::join!(
            services.order_sync.stop(),
            services.position_sync.stop(),
            services.reconciler.stop(),
        );
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, stop_all).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Background services did not stop in time"
        );
    } else {
        tracing::info!("Background services stopped");
    }
}
