use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::analyzer::{
    analyze_investment, compute_benchmark, estimate_negotiation, ComparableMatcher, ConditionTable,
    DriverTable, InvestmentAnalysis, PriceAdjuster, ValueDriverModel,
};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, ScoringPath, ALERT_MIN_SCORE, MAX_COMPARABLES};
use crate::db::ListingStore;
use crate::error::{AppError, Result};
use crate::scorer::classifier::{
    BenchmarkDrivenPolicy, CategoryCatalog, CategoryInputs, CategoryPolicy, ScoreThresholdPolicy,
};
use crate::scorer::listing_score::score_listing_metrics;
use crate::scorer::opportunity::{score_opportunity, OpportunityInputs};
use crate::types::{
    now_ns, reduction_from_original, AlertType, Comparable, Confidence, Listing, ListingMetrics,
    ListingStatus, MarketBenchmark, NegotiationEstimate, OpportunityCategory, OpportunityScore,
    PriceDrops, PriceHistoryEntry, ValueDriverImpact,
};

/// (parish, municipality, typology) of a benchmark snapshot.
type ZoneKey = (String, String, String);

/// Driver uplift at which proximity is worth mentioning as a reason.
const DRIVER_REASON_MIN: f64 = 0.10;

/// Knobs and lookup tables the engine is built from.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scoring_path: ScoringPath,
    pub max_comparables: usize,
    pub alert_min_score: i64,
    pub conditions: ConditionTable,
    pub drivers: DriverTable,
    pub catalog: CategoryCatalog,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scoring_path: ScoringPath::Opportunity,
            max_comparables: MAX_COMPARABLES,
            alert_min_score: ALERT_MIN_SCORE,
            conditions: ConditionTable::default(),
            drivers: DriverTable::default(),
            catalog: CategoryCatalog::default(),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            scoring_path: cfg.scoring_path,
            max_comparables: cfg.max_comparables,
            alert_min_score: cfg.alert_min_score,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum ScoreDetail {
    Opportunity(OpportunityScore),
    Listing(ListingMetrics),
}

/// Everything one scoring run produced for a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub listing_id: String,
    pub score: i64,
    /// `None` when no benchmark was available, or the policy matched nothing.
    pub category: Option<OpportunityCategory>,
    pub reasons: Vec<String>,
    pub detail: ScoreDetail,
    pub comparables: usize,
    pub benchmark: Option<MarketBenchmark>,
    /// False when the benchmark is a stored snapshot rather than computed now.
    pub benchmark_is_fresh: bool,
    pub negotiation: NegotiationEstimate,
    pub value_drivers: ValueDriverImpact,
}

/// Scores listings against their comparables and keeps the store's
/// score, category and alerts current.
pub struct ScoringEngine {
    store: ListingStore,
    matcher: ComparableMatcher,
    adjuster: PriceAdjuster,
    drivers: ValueDriverModel,
    benchmark_policy: BenchmarkDrivenPolicy,
    threshold_policy: ScoreThresholdPolicy,
    catalog: CategoryCatalog,
    settings: EngineSettings,
    latency: Arc<LatencyStats>,
    health: Arc<HealthState>,
}

impl ScoringEngine {
    pub fn new(
        store: ListingStore,
        settings: EngineSettings,
        latency: Arc<LatencyStats>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            store,
            matcher: ComparableMatcher::new(settings.max_comparables),
            adjuster: PriceAdjuster::new(settings.conditions.clone()),
            drivers: ValueDriverModel::new(settings.drivers.clone()),
            benchmark_policy: BenchmarkDrivenPolicy::default(),
            threshold_policy: ScoreThresholdPolicy::default(),
            catalog: settings.catalog.clone(),
            settings,
            latency,
            health,
        }
    }

    pub fn scoring_path(&self) -> ScoringPath {
        self.settings.scoring_path
    }

    pub fn catalog(&self) -> &CategoryCatalog {
        &self.catalog
    }

    /// The category policy paired with the configured scoring path.
    fn policy(&self) -> &dyn CategoryPolicy {
        match self.settings.scoring_path {
            ScoringPath::Opportunity => &self.benchmark_policy,
            ScoringPath::Listing => &self.threshold_policy,
        }
    }

    /// Full passes on the interval (the first fires immediately), single-listing
    /// rescores as the writer requests them.
    pub async fn run(self: Arc<Self>, interval_secs: u64, mut rescore_rx: mpsc::Receiver<String>) {
        self.health.set_engine_running(true);
        info!(
            path = %self.settings.scoring_path,
            policy = self.policy().name(),
            interval_secs,
            "Scoring engine started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut rescore_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.score_all().await {
                        error!("Scoring pass error: {e}");
                    }
                }
                maybe_id = rescore_rx.recv(), if rescore_open => match maybe_id {
                    Some(id) => {
                        if let Err(e) = self.score_listing(&id).await {
                            warn!(listing_id = %id, "Rescore failed: {e}");
                        }
                    }
                    None => {
                        warn!("Rescore channel closed; continuing with interval passes only");
                        rescore_open = false;
                    }
                },
            }
        }
    }

    /// Score every active listing, one at a time. Failures are logged and
    /// skipped. Returns how many were scored.
    pub async fn score_all(&self) -> Result<usize> {
        let started = Instant::now();
        let pool = self.store.active_listings().await?;

        let mut saved_zones = HashSet::new();
        let mut scored = 0usize;
        for target in &pool {
            match self.score_target(target, &pool, &mut saved_zones).await {
                Ok(_) => scored += 1,
                Err(e) => warn!(listing_id = %target.id, "Scoring failed: {e}"),
            }
        }

        self.health.set_last_pass_at_ns(now_ns().max(0) as u64);
        info!(
            scored,
            active = pool.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scoring pass complete"
        );
        Ok(scored)
    }

    /// Score one listing against the current active pool. Non-active listings
    /// are left alone and yield `None`.
    pub async fn score_listing(&self, id: &str) -> Result<Option<Evaluation>> {
        let target = self
            .store
            .get_listing(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("listing {id}")))?;
        if target.status != ListingStatus::Active {
            debug!(listing_id = %id, status = %target.status, "skipping non-active listing");
            return Ok(None);
        }
        let pool = self.store.active_listings().await?;
        self.score_target(&target, &pool, &mut HashSet::new()).await.map(Some)
    }

    /// Fair price and renovation outlook for one listing.
    pub async fn analysis(
        &self,
        id: &str,
        renovation_cost: Option<f64>,
    ) -> Result<InvestmentAnalysis> {
        let target = self
            .store
            .get_listing(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("listing {id}")))?;
        let pool = self.store.active_listings().await?;
        let history = self.store.get_price_history(id).await?;
        let comparables = self.matcher.find(&target, &pool);
        analyze_investment(
            &target,
            &comparables,
            &history,
            &self.adjuster,
            &self.drivers,
            renovation_cost,
        )
    }

    /// `saved_zones` holds the zones whose benchmark was already persisted in
    /// this run; each zone gets at most one snapshot per run.
    async fn score_target(
        &self,
        target: &Listing,
        pool: &[Listing],
        saved_zones: &mut HashSet<ZoneKey>,
    ) -> Result<Evaluation> {
        let started = Instant::now();
        let history = self.store.get_price_history(&target.id).await?;
        let comparables = self.matcher.find(target, pool);

        let (benchmark, fresh) = match compute_benchmark(target, &comparables) {
            Ok(benchmark) => (Some(benchmark), true),
            Err(AppError::EmptyComparables) => {
                let stored = self.store.get_benchmark(&target.parish, &target.typology).await?;
                if stored.is_none() {
                    debug!(listing_id = %target.id, "no comparables and no stored benchmark");
                }
                (stored, false)
            }
            Err(e) => return Err(e),
        };

        if let Some(benchmark) = benchmark.as_ref().filter(|_| fresh) {
            let zone = (
                benchmark.parish.clone(),
                benchmark.municipality.clone(),
                benchmark.typology.clone(),
            );
            if !saved_zones.contains(&zone) {
                self.store.save_benchmark(benchmark).await?;
                saved_zones.insert(zone);
            }
        }

        let mut evaluation = self.evaluate(target, &comparables, &history, benchmark.as_ref());
        evaluation.benchmark_is_fresh = fresh;

        self.store
            .record_score(&target.id, evaluation.score, evaluation.category, now_ns())
            .await?;
        self.raise_alerts(target, &evaluation).await?;

        self.latency.record(started.elapsed());
        self.health.inc_listings_scored();
        debug!(
            listing_id = %target.id,
            score = evaluation.score,
            category = ?evaluation.category,
            comparables = evaluation.comparables,
            "scored listing"
        );
        Ok(evaluation)
    }

    /// Pure scoring step: no I/O. Without a benchmark the score is still
    /// computed but the category is left unset.
    pub fn evaluate(
        &self,
        target: &Listing,
        comparables: &[Comparable],
        history: &[PriceHistoryEntry],
        benchmark: Option<&MarketBenchmark>,
    ) -> Evaluation {
        let price_per_m2 = target.price_per_m2();
        let market_avg = benchmark.map(|b| b.avg_price_m2);
        let drops = PriceDrops::from_history(history);

        let negotiation =
            estimate_negotiation(target.days_on_market, history, price_per_m2, market_avg);
        let value_drivers = self.drivers.impact(&target.driver_distances);

        let mut inputs = CategoryInputs {
            days_on_market: target.days_on_market,
            reduction_from_original_pct: reduction_from_original(history, target.price),
            drops,
            price_per_m2,
            benchmark_avg_price_m2: market_avg,
            intervention_drivers: target.intervention_drivers.len(),
            score: 0,
        };

        let (score, category, mut reasons, detail) = match self.settings.scoring_path {
            ScoringPath::Opportunity => {
                let mut result = score_opportunity(&OpportunityInputs {
                    typology: &target.typology,
                    days_on_market: target.days_on_market,
                    reduction_from_original_pct: inputs.reduction_from_original_pct,
                    vs_benchmark_pct: inputs.vs_benchmark_pct(),
                    intervention_drivers: inputs.intervention_drivers,
                    zone_drivers: &target.zone_drivers,
                    risks: target.risks.len(),
                    condition: &target.condition,
                    year_built: target.year_built,
                });
                inputs.score = result.total;
                result.category = benchmark.and_then(|_| self.policy().classify(&inputs));
                (result.total, result.category, result.reasons.clone(), ScoreDetail::Opportunity(result))
            }
            ScoringPath::Listing => {
                let mut metrics = score_listing_metrics(
                    target.days_on_market,
                    drops,
                    price_per_m2,
                    market_avg,
                );
                inputs.score = metrics.score;
                metrics.category = benchmark.and_then(|_| self.policy().classify(&inputs));
                (metrics.score, metrics.category, metrics.reasons.clone(), ScoreDetail::Listing(metrics))
            }
        };

        if value_drivers.total >= DRIVER_REASON_MIN {
            reasons.push(format!("Value drivers nearby (+{:.0}%)", value_drivers.total * 100.0));
        }
        if negotiation.confidence == Confidence::High {
            reasons.push(format!(
                "Negotiation room up to {:.0}%",
                negotiation.max_discount_percent
            ));
        }

        Evaluation {
            listing_id: target.id.clone(),
            score,
            category,
            reasons,
            detail,
            comparables: comparables.len(),
            benchmark: benchmark.cloned(),
            benchmark_is_fresh: false,
            negotiation,
            value_drivers,
        }
    }

    /// `previous` is the listing as loaded before this run's score was stored.
    async fn raise_alerts(&self, previous: &Listing, evaluation: &Evaluation) -> Result<()> {
        if let Some(category @ (OpportunityCategory::A | OpportunityCategory::B)) =
            evaluation.category
        {
            if previous.opportunity_category != Some(category) {
                let message = format!(
                    "New category {} opportunity ({}), score {}",
                    category,
                    self.catalog.name(category),
                    evaluation.score
                );
                self.store
                    .create_alert(&previous.id, AlertType::NewOpportunity, &message)
                    .await?;
            }
        }

        let threshold = self.settings.alert_min_score;
        if previous.opportunity_score < threshold && evaluation.score >= threshold {
            let message = format!("Score rose to {}", evaluation.score);
            self.store.create_alert(&previous.id, AlertType::HighScore, &message).await?;
        }
        Ok(())
    }
}
