use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::analyzer::InvestmentAnalysis;
use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencyPercentiles, LatencyStats};
use crate::config::paging;
use crate::db::{ListingFilter, ListingStore, StoreStats};
use crate::error::AppError;
use crate::ingest::parse_batch;
use crate::scorer::classifier::CategoryInfo;
use crate::scorer::ScoringEngine;
use crate::types::{
    Alert, AlertType, Listing, MarketBenchmark, OpportunityCategory, PriceHistoryEntry,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: ListingStore,
    pub engine: Arc<ScoringEngine>,
    pub ingest_tx: mpsc::Sender<Listing>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/listings", get(get_listings).post(post_listings))
        .route("/listings/:id", get(get_listing))
        .route("/listings/:id/history", get(get_listing_history))
        .route("/listings/:id/analysis", get(get_listing_analysis))
        .route("/benchmarks", get(get_benchmark))
        .route("/benchmarks/history", get(get_benchmark_history))
        .route("/opportunities/curated", get(get_curated))
        .route("/alerts", get(get_alerts).post(post_alert))
        .route("/alerts/:id/read", post(post_alert_read))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/latency", get(get_stats_latency))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query and body structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AnalysisQuery {
    pub renovation_cost: Option<f64>,
}

#[derive(Deserialize)]
pub struct BenchmarkQuery {
    pub parish: String,
    pub typology: String,
}

#[derive(Deserialize)]
pub struct BenchmarkHistoryQuery {
    pub parish: String,
    pub typology: String,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateAlertRequest {
    pub listing_id: String,
    pub alert_type: Option<AlertType>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct IngestResponse {
    pub total: usize,
    pub queued: usize,
    pub rejected: usize,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub stats: StoreStats,
    pub scoring_path: String,
    /// Category code → display name and expected score.
    pub categories: BTreeMap<String, CategoryInfo>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_listings(
    State(state): State<ApiState>,
    Query(filter): Query<ListingFilter>,
) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(state.store.get_listings(&filter).await?))
}

/// Validates the batch and queues it for the writer; scoring follows asynchronously.
async fn post_listings(
    State(state): State<ApiState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let (listings, stats) = parse_batch(&body)?;
    let queued = listings.len();

    for listing in listings {
        state.health.inc_ingest_queue_pending();
        if let Err(e) = state.ingest_tx.send(listing).await {
            state.health.dec_ingest_queue_pending();
            return Err(AppError::ChannelSend(e.to_string()));
        }
    }

    info!(total = stats.total, queued, rejected = stats.rejected(), "Queued listings via API");
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse { total: stats.total, queued, rejected: stats.rejected() }),
    ))
}

async fn get_listing(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Listing>, AppError> {
    state
        .store
        .get_listing(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("listing {id}")))
}

async fn get_listing_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PriceHistoryEntry>>, AppError> {
    if state.store.get_listing(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("listing {id}")));
    }
    Ok(Json(state.store.get_price_history(&id).await?))
}

async fn get_listing_analysis(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<AnalysisQuery>,
) -> Result<Json<InvestmentAnalysis>, AppError> {
    Ok(Json(state.engine.analysis(&id, params.renovation_cost).await?))
}

async fn get_benchmark(
    State(state): State<ApiState>,
    Query(params): Query<BenchmarkQuery>,
) -> Result<Json<MarketBenchmark>, AppError> {
    state
        .store
        .get_benchmark(&params.parish, &params.typology)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!("benchmark for {} {}", params.parish, params.typology))
        })
}

async fn get_benchmark_history(
    State(state): State<ApiState>,
    Query(params): Query<BenchmarkHistoryQuery>,
) -> Result<Json<Vec<MarketBenchmark>>, AppError> {
    let limit = params.limit.unwrap_or(paging::BENCHMARKS_LIMIT);
    Ok(Json(state.store.benchmark_history(&params.parish, &params.typology, limit).await?))
}

async fn get_curated(State(state): State<ApiState>) -> Result<Json<Vec<Listing>>, AppError> {
    Ok(Json(state.store.curated().await?))
}

async fn get_alerts(
    State(state): State<ApiState>,
    Query(params): Query<AlertsQuery>,
) -> Result<Json<Vec<Alert>>, AppError> {
    let alerts = state
        .store
        .get_alerts(params.unread_only.unwrap_or(false), params.limit)
        .await?;
    Ok(Json(alerts))
}

async fn post_alert(
    State(state): State<ApiState>,
    Json(req): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    if state.store.get_listing(&req.listing_id).await?.is_none() {
        return Err(AppError::NotFound(format!("listing {}", req.listing_id)));
    }
    let alert_type = req.alert_type.unwrap_or(AlertType::Manual);
    let id = state.store.create_alert(&req.listing_id, alert_type, &req.message).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn post_alert_read(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if state.store.mark_alert_read(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("alert {id}")))
    }
}

async fn get_stats_summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, AppError> {
    let stats = state.store.get_stats().await?;
    let catalog = state.engine.catalog();
    let categories = OpportunityCategory::ALL
        .iter()
        .filter_map(|&c| catalog.info(c).map(|info| (c.code().to_string(), info.clone())))
        .collect();
    Ok(Json(SummaryResponse {
        stats,
        scoring_path: state.engine.scoring_path().to_string(),
        categories,
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyPercentiles> {
    Json(state.latency.percentiles())
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}
