use crate::error::{AppError, Result};
use crate::types::{Comparable, Listing, MarketBenchmark};

/// Zone statistics over the comparables' price/m², labelled with the target's
/// parish, municipality and typology.
///
/// Fails with `EmptyComparables` when there is nothing to aggregate. Trend
/// fields stay 0.0 until historical series are tracked.
pub fn compute_benchmark(target: &Listing, comparables: &[Comparable]) -> Result<MarketBenchmark> {
    if comparables.is_empty() {
        return Err(AppError::EmptyComparables);
    }

    let mut prices: Vec<f64> = comparables.iter().map(|c| c.price_per_m2).collect();
    prices.sort_by(f64::total_cmp);

    let n = prices.len() as f64;
    let avg = prices.iter().sum::<f64>() / n;
    let variance = prices.iter().map(|p| (p - avg).powi(2)).sum::<f64>() / n;

    Ok(MarketBenchmark {
        parish: target.parish.clone(),
        municipality: target.municipality.clone(),
        typology: target.typology.clone(),
        avg_price_m2: avg,
        median_price_m2: median(&prices),
        min_price_m2: prices[0],
        max_price_m2: prices[prices.len() - 1],
        stdev_price_m2: if prices.len() > 1 { variance.sqrt() } else { 0.0 },
        sample_size: prices.len() as i64,
        trend_6m: 0.0,
        trend_12m: 0.0,
        recorded_at: None,
    })
}

/// `sorted` must be non-empty and ascending.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
