mod analyzer;
mod api;
mod config;
mod db;
mod error;
mod ingest;
mod scorer;
mod sweeper;
mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState, HealthState, LatencyStats};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::{ListingStore, ListingWriter};
use crate::error::Result;
use crate::ingest::load_batch;
use crate::scorer::{EngineSettings, ScoringEngine};
use crate::sweeper::StatusSweeper;
use crate::types::Listing;

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
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    let store = ListingStore::new(pool);

    // --- Shared instrumentation ---
    let latency = Arc::new(LatencyStats::new()?);
    let health = Arc::new(HealthState::new());

    // --- Channels ---
    let (ingest_tx, ingest_rx) = mpsc::channel::<Listing>(CHANNEL_CAPACITY);
    let (rescore_tx, rescore_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    // --- Spawn tasks ---

    // Listing writer: sole consumer of the ingest queue
    let writer = ListingWriter::new(store.clone(), ingest_rx, rescore_tx, Arc::clone(&health));
    tokio::spawn(async move { writer.run().await });

    // Scoring engine (full pass every SCORER_INTERVAL_SECS, rescore on ingest)
    let engine = Arc::new(ScoringEngine::new(
        store.clone(),
        EngineSettings::from(&cfg),
        Arc::clone(&latency),
        Arc::clone(&health),
    ));
    let engine_task = Arc::clone(&engine);
    let scorer_interval = cfg.scorer_interval_secs;
    tokio::spawn(async move { engine_task.run(scorer_interval, rescore_rx).await });

    // Stale listing sweeper
    let sweeper = StatusSweeper::new(
        store.clone(),
        cfg.sweep_interval_secs,
        cfg.stale_after_days,
        Arc::clone(&health),
    );
    tokio::spawn(async move { sweeper.run().await });

    // Startup batch (optional)
    match &cfg.ingest_path {
        Some(source) => {
            let source = source.clone();
            let tx = ingest_tx.clone();
            let health = Arc::clone(&health);
            tokio::spawn(async move { ingest_startup_batch(&source, tx, health).await });
        }
        None => warn!("INGEST_PATH not set: listings arrive only through POST /listings"),
    }

    // HTTP API server
    let api_state = ApiState {
        store,
        engine,
        ingest_tx,
        latency,
        health,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(scoring_path = %cfg.scoring_path, "HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Loads the configured batch and queues it for the writer. A bad source is
/// logged; the service keeps running on whatever producers remain.
async fn ingest_startup_batch(source: &str, tx: mpsc::Sender<Listing>, health: Arc<HealthState>) {
    let (listings, stats) = match load_batch(source).await {
        Ok(batch) => batch,
        Err(e) => {
            error!(source, "Startup ingest failed: {e}");
            return;
        }
    };
    info!(
        source,
        total = stats.total,
        accepted = stats.accepted,
        "Startup batch loaded"
    );
    if stats.rejected() > 0 {
        info!(
            "[INGEST] rejected: malformed={} no_id={} no_url={} no_portal={} bad_numbers={}",
            stats.rejected_malformed,
            stats.rejected_no_id,
            stats.rejected_no_url,
            stats.rejected_no_portal,
            stats.rejected_bad_numbers,
        );
    }

    for listing in listings {
        health.inc_ingest_queue_pending();
        if tx.send(listing).await.is_err() {
            health.dec_ingest_queue_pending();
            warn!("Ingest channel closed during startup batch");
            return;
        }
    }
}
