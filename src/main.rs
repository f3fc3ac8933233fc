use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use market_sync::api::{router, ApiState};
use market_sync::config::Config;
use market_sync::error::Result;
use market_sync::metrics::{LatencyStats, SyncHealth};
use market_sync::{Engine, EpochScheduler, HttpMarketReader, MarketReader};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let health = Arc::new(SyncHealth::new());
    let latency = Arc::new(LatencyStats::new());

    // --- Remote reader + sync engine ---
    let reader: Option<Arc<dyn MarketReader>> = match &cfg.rpc_url {
        Some(url) => {
            info!("Ledger view gateway: {url}");
            Some(Arc::new(HttpMarketReader::new(url.as_str())?))
        }
        None => {
            warn!("MARKET_RPC_URL not set; market sync disabled, API will serve an empty cache");
            None
        }
    };

    let engine = match &reader {
        Some(reader) => {
            let (engine, worker) = Engine::new(
                Arc::clone(reader),
                cfg.fetch.clone(),
                Arc::clone(&health),
                Arc::clone(&latency),
            );
            tokio::spawn(async move { worker.run().await });
            engine
        }
        None => Engine::disabled(Arc::clone(&health)),
    };

    info!(
        initial_batch = cfg.fetch.initial_batch_size,
        min_batch = cfg.fetch.min_batch_size,
        max_retries = cfg.fetch.max_retries,
        epoch_secs = cfg.epoch_secs,
        "Engine ready",
    );

    // --- Seed tracked polls ---
    if !cfg.tracked_polls.is_empty() {
        info!("Loading {} tracked polls", cfg.tracked_polls.len());
        engine.request_load(&cfg.tracked_polls);
    }

    // --- Epoch scheduler (tick + silent refresh every epoch) ---
    let scheduler = EpochScheduler::new(engine.clone(), cfg.epoch_secs);
    tokio::spawn(async move { scheduler.run().await });

    // --- HTTP API ---
    let api_state = ApiState {
        engine,
        reader,
        health,
        latency,
        epoch_secs: cfg.epoch_secs,
        volume_page_size: cfg.volume_page_size,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
