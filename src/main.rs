//! Bridge Relayer - cross-chain swap execution core
//!
//! Verifies lock transactions on the source chain and burn logs on the
//! destination chain, then builds, DCRM-signs and broadcasts the matching
//! outbound transaction exactly once.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod error;
mod metrics;
mod state;
mod tokens;
mod tx;
mod types;
mod worker;

#[cfg(test)]
mod testing;

use chain::{BridgeContext, BridgeSet, MemoPrefixes};
use config::{DatabaseConfig, Settings};
use metrics::MetricsServer;
use state::{MemorySwapStore, PgSwapStore, SwapStore};
use tokens::SwapValueRules;
use tx::{DcrmClient, NonceAllocator, SignCoordinator};
use worker::{Scheduler, SwapHistory, SwapWorker};

const MEMORY_STORE_URL: &str = "memory://";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Bridge Relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} ({}) <-> {} ({})",
        settings.src.name, settings.src.token.symbol, settings.dst.name, settings.dst.token.symbol
    );

    let store = open_store(&settings.database).await?;

    // Signing goes through the DCRM node
    let dcrm = Arc::new(DcrmClient::new(&settings.mpc)?);
    let signer = Arc::new(SignCoordinator::new(dcrm, &settings.mpc));

    let ctx = BridgeContext {
        values: Arc::new(SwapValueRules::new(&settings.src.token, &settings.dst.token)?),
        memo: MemoPrefixes::from(&settings.bridge),
        nonces: Arc::new(NonceAllocator::new()),
        signer,
    };
    let bridges = BridgeSet::from_settings(&settings, ctx)?;

    bridges.src.verify_contract_address().await?;
    bridges.dst.verify_contract_address().await?;
    info!("Contract addresses verified");

    let worker = Arc::new(SwapWorker::new(
        bridges.clone(),
        store.clone(),
        Arc::new(SwapHistory::new(settings.bridge.history_capacity)),
        &settings.bridge,
    ));
    let scheduler = Arc::new(Scheduler::new(worker.clone(), &settings.bridge));
    let scheduler_handles = scheduler.start();

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = api::AppState {
            store: store.clone(),
            bridges: bridges.clone(),
            worker,
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = settings.metrics.enabled.then(|| {
        let server = MetricsServer::new(settings.metrics.port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let bridges = bridges.clone();
        let store = store.clone();
        let interval = settings.bridge.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                let (src, dst) = bridges.health_check().await;
                if !src {
                    warn!("Chain {} health check failed", bridges.src.name());
                }
                if !dst {
                    warn!("Chain {} health check failed", bridges.dst.name());
                }

                match store.health_check().await {
                    Ok(()) if src && dst => metrics::record_health_check(),
                    Ok(()) => metrics::record_health_check_failure(),
                    Err(e) => {
                        warn!("Database health check failed: {}", e);
                        metrics::record_health_check_failure();
                    }
                }
            }
        }
    });

    info!("Bridge Relayer {} is running", settings.bridge.instance_id);
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Let in-flight swaps finish their current pass
    scheduler.stop();
    futures::future::join_all(scheduler_handles).await;

    api_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Bridge Relayer stopped");
    Ok(())
}

async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn SwapStore>> {
    if config.url == MEMORY_STORE_URL {
        warn!("Using the in-memory swap store, swaps will not survive a restart");
        return Ok(Arc::new(MemorySwapStore::new()));
    }

    let store = PgSwapStore::new(config).await?;
    info!("Database connection established");

    store.run_migrations().await?;
    info!("Database migrations complete");

    Ok(Arc::new(store))
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,bridge_relayer=debug,sqlx=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
