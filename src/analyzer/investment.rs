use serde::Serialize;

use crate::analyzer::adjustment::PriceAdjuster;
use crate::analyzer::benchmark::compute_benchmark;
use crate::analyzer::drivers::ValueDriverModel;
use crate::analyzer::negotiation::estimate_negotiation;
use crate::config::FAIR_PRICE_COMPARABLES;
use crate::error::Result;
use crate::types::{Comparable, Listing, NegotiationEstimate, PriceHistoryEntry, ValueDriverImpact};

/// Conservative uplift applied to the fair price after renovation.
const POST_RENOVATION_UPLIFT: f64 = 1.15;

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub avg_price_m2: f64,
    pub median_price_m2: f64,
    pub sample_size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparablesSummary {
    pub count: usize,
    pub avg_similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenovationOutlook {
    pub estimated_cost: f64,
    pub post_renovation_estimate: f64,
    pub total_investment: f64,
    pub potential_profit: f64,
    pub roi_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentAnalysis {
    pub listing_id: String,
    pub current_price: Option<f64>,
    pub fair_price_m2: f64,
    pub fair_price_estimate: f64,
    /// Positive when asking above the fair estimate.
    pub price_vs_fair_percent: f64,
    pub market: BenchmarkSummary,
    pub negotiation: NegotiationEstimate,
    pub value_drivers: ValueDriverImpact,
    pub comparables: ComparablesSummary,
    pub renovation: Option<RenovationOutlook>,
}

/// Fair price from the best condition-adjusted comparables, with an optional
/// renovation outlook. Needs at least one comparable.
pub fn analyze_investment(
    target: &Listing,
    comparables: &[Comparable],
    history: &[PriceHistoryEntry],
    adjuster: &PriceAdjuster,
    drivers: &ValueDriverModel,
    renovation_cost: Option<f64>,
) -> Result<InvestmentAnalysis> {
    let market = compute_benchmark(target, comparables)?;
    let negotiation = estimate_negotiation(
        target.days_on_market,
        history,
        target.price_per_m2(),
        Some(market.avg_price_m2),
    );
    let value_drivers = drivers.impact(&target.driver_distances);

    let adjusted: Vec<f64> = comparables
        .iter()
        .take(FAIR_PRICE_COMPARABLES)
        .map(|c| adjuster.adjust(c, &target.condition))
        .collect();
    let fair_price_m2 = adjusted.iter().sum::<f64>() / adjusted.len() as f64;

    let area = target.area_m2.unwrap_or(0.0);
    let fair_price = fair_price_m2 * area;
    let current = target.price.unwrap_or(0.0);
    let price_vs_fair_percent = if fair_price > 0.0 {
        (current - fair_price) / fair_price * 100.0
    } else {
        0.0
    };

    let renovation = renovation_cost.filter(|&c| c > 0.0).map(|cost| {
        let post = fair_price * POST_RENOVATION_UPLIFT;
        let total = current + cost;
        let profit = post - total;
        RenovationOutlook {
            estimated_cost: cost,
            post_renovation_estimate: post,
            total_investment: total,
            potential_profit: profit,
            roi_percent: if total > 0.0 { profit / total * 100.0 } else { 0.0 },
        }
    });

    let avg_similarity =
        comparables.iter().map(|c| c.similarity_score).sum::<f64>() / comparables.len() as f64;

    Ok(InvestmentAnalysis {
        listing_id: target.id.clone(),
        current_price: target.price,
        fair_price_m2,
        fair_price_estimate: fair_price,
        price_vs_fair_percent,
        market: BenchmarkSummary {
            avg_price_m2: market.avg_price_m2,
            median_price_m2: market.median_price_m2,
            sample_size: market.sample_size,
        },
        negotiation,
        value_drivers,
        comparables: ComparablesSummary { count: comparables.len(), avg_similarity },
        renovation,
    })
}
