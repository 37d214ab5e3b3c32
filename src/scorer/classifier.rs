use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{OpportunityCategory, PriceDrops};

/// Everything either category policy may look at.
#[derive(Debug, Clone, Default)]
pub struct CategoryInputs {
    pub days_on_market: i64,
    /// Cut from the first recorded price, in percent.
    pub reduction_from_original_pct: Option<f64>,
    pub drops: PriceDrops,
    pub price_per_m2: Option<f64>,
    pub benchmark_avg_price_m2: Option<f64>,
    pub intervention_drivers: usize,
    /// Score produced by the path that owns the policy.
    pub score: i64,
}

impl CategoryInputs {
    /// Signed distance from the benchmark average, in percent (negative = cheaper).
    pub fn vs_benchmark_pct(&self) -> Option<f64> {
        let ppm2 = self.price_per_m2?;
        let avg = self.benchmark_avg_price_m2.filter(|&a| a > 0.0)?;
        Some((ppm2 - avg) / avg * 100.0)
    }
}

/// A first-match-wins rule set mapping inputs to a category.
pub trait CategoryPolicy {
    fn name(&self) -> &'static str;
    fn classify(&self, inputs: &CategoryInputs) -> Option<OpportunityCategory>;
}

/// Opportunity-scoped rules: stagnation, aggressive entry price, intervention
/// potential, then D for everything that reaches the end.
#[derive(Debug, Clone)]
pub struct BenchmarkDrivenPolicy {
    pub stagnant_min_days: i64,
    pub stagnant_min_reduction_pct: f64,
    pub aggressive_max_days: i64,
    pub aggressive_min_discount_pct: f64,
}

impl Default for BenchmarkDrivenPolicy {
    fn default() -> Self {
        Self {
            stagnant_min_days: 180,
            stagnant_min_reduction_pct: 10.0,
            aggressive_max_days: 30,
            aggressive_min_discount_pct: 12.0,
        }
    }
}

impl CategoryPolicy for BenchmarkDrivenPolicy {
    fn name(&self) -> &'static str {
        "benchmark_driven"
    }

    fn classify(&self, inputs: &CategoryInputs) -> Option<OpportunityCategory> {
        if inputs.days_on_market >= self.stagnant_min_days
            && inputs
                .reduction_from_original_pct
                .is_some_and(|r| r >= self.stagnant_min_reduction_pct)
        {
            return Some(OpportunityCategory::A);
        }

        let vs_benchmark = inputs.vs_benchmark_pct();

        if inputs.days_on_market <= self.aggressive_max_days
            && vs_benchmark.is_some_and(|v| v <= -self.aggressive_min_discount_pct)
        {
            return Some(OpportunityCategory::B);
        }

        if vs_benchmark.is_some_and(|v| v < 0.0) && inputs.intervention_drivers > 0 {
            return Some(OpportunityCategory::C);
        }

        Some(OpportunityCategory::D)
    }
}

/// Listing-scoped rules: stagnation by repeated cuts, aggressive entry price,
/// then score floors. Falls through to unscored.
#[derive(Debug, Clone)]
pub struct ScoreThresholdPolicy {
    pub stagnant_min_days: i64,
    pub stagnant_min_drops: usize,
    pub stagnant_min_total_drop_pct: f64,
    pub aggressive_max_days: i64,
    pub aggressive_min_discount_pct: f64,
    pub intervention_min_score: i64,
    /// Absolute €/m² ceiling for score-only C.
    pub intervention_max_price_m2: f64,
    pub fallback_min_score: i64,
}

impl Default for ScoreThresholdPolicy {
    fn default() -> Self {
        Self {
            stagnant_min_days: 180,
            stagnant_min_drops: 2,
            stagnant_min_total_drop_pct: 10.0,
            aggressive_max_days: 30,
            aggressive_min_discount_pct: 12.0,
            intervention_min_score: 50,
            intervention_max_price_m2: 2_000.0,
            fallback_min_score: 40,
        }
    }
}

impl CategoryPolicy for ScoreThresholdPolicy {
    fn name(&self) -> &'static str {
        "score_threshold"
    }

    fn classify(&self, inputs: &CategoryInputs) -> Option<OpportunityCategory> {
        if inputs.days_on_market >= self.stagnant_min_days
            && inputs.drops.count >= self.stagnant_min_drops
            && inputs.drops.total_percent >= self.stagnant_min_total_drop_pct
        {
            return Some(OpportunityCategory::A);
        }

        if inputs.days_on_market <= self.aggressive_max_days
            && inputs
                .vs_benchmark_pct()
                .is_some_and(|v| -v >= self.aggressive_min_discount_pct)
        {
            return Some(OpportunityCategory::B);
        }

        if inputs.score >= self.intervention_min_score
            && inputs.price_per_m2.is_some_and(|p| p < self.intervention_max_price_m2)
        {
            return Some(OpportunityCategory::C);
        }

        if inputs.score >= self.fallback_min_score {
            return Some(OpportunityCategory::D);
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Category metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    /// Score a listing in this category is expected to reach.
    pub min_score: i64,
}

#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    entries: BTreeMap<OpportunityCategory, CategoryInfo>,
}

impl CategoryCatalog {
    pub fn new(entries: impl IntoIterator<Item = (OpportunityCategory, CategoryInfo)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    pub fn name(&self, category: OpportunityCategory) -> &str {
        self.entries.get(&category).map_or("", |info| info.name.as_str())
    }

    pub fn info(&self, category: OpportunityCategory) -> Option<&CategoryInfo> {
        self.entries.get(&category)
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        let info = |name: &str, min_score| CategoryInfo { name: name.to_string(), min_score };
        Self::new([
            (OpportunityCategory::A, info("Estagnado", 70)),
            (OpportunityCategory::B, info("Preço Agressivo", 60)),
            (OpportunityCategory::C, info("Potencial Intervenção", 50)),
            (OpportunityCategory::D, info("Outras Fundamentadas", 40)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(days: i64, ppm2: f64, avg: f64) -> CategoryInputs {
        CategoryInputs {
            days_on_market: days,
            price_per_m2: Some(ppm2),
            benchmark_avg_price_m2: Some(avg),
            ..Default::default()
        }
    }

    #[test]
    fn stagnant_listing_with_cut_is_a() {
        // 195 days, three cuts adding up to 11%, 3350 vs 3800 (-11.8%)
        let i = CategoryInputs {
            reduction_from_original_pct: Some(11.0),
            drops: PriceDrops { count: 3, total_percent: 11.3 },
            intervention_drivers: 1,
            score: 60,
            ..inputs(195, 3_350.0, 3_800.0)
        };
        assert_eq!(BenchmarkDrivenPolicy::default().classify(&i), Some(OpportunityCategory::A));
        assert_eq!(ScoreThresholdPolicy::default().classify(&i), Some(OpportunityCategory::A));
    }

    #[test]
    fn fresh_deep_discount_is_b() {
        // 8 days, 3545 vs 5200 (-31.8%)
        let i = inputs(8, 3_545.0, 5_200.0);
        assert_eq!(BenchmarkDrivenPolicy::default().classify(&i), Some(OpportunityCategory::B));
        assert_eq!(ScoreThresholdPolicy::default().classify(&i), Some(OpportunityCategory::B));
    }

    #[test]
    fn benchmark_policy_c_needs_discount_and_driver() {
        let policy = BenchmarkDrivenPolicy::default();
        let mut i = inputs(60, 3_700.0, 3_800.0);
        assert_eq!(policy.classify(&i), Some(OpportunityCategory::D));
        i.intervention_drivers = 2;
        assert_eq!(policy.classify(&i), Some(OpportunityCategory::C));
        i.price_per_m2 = Some(3_900.0);
        assert_eq!(policy.classify(&i), Some(OpportunityCategory::D));
    }

    #[test]
    fn benchmark_policy_without_benchmark_falls_to_d() {
        let i = CategoryInputs { days_on_market: 5, intervention_drivers: 3, ..Default::default() };
        assert_eq!(BenchmarkDrivenPolicy::default().classify(&i), Some(OpportunityCategory::D));
    }

    #[test]
    fn reduction_below_threshold_is_not_a() {
        let i = CategoryInputs {
            reduction_from_original_pct: Some(9.9),
            ..inputs(400, 4_000.0, 4_000.0)
        };
        assert_eq!(BenchmarkDrivenPolicy::default().classify(&i), Some(OpportunityCategory::D));
    }

    #[test]
    fn score_policy_uses_absolute_threshold_and_floors() {
        let policy = ScoreThresholdPolicy::default();
        let mut i = CategoryInputs { score: 55, ..inputs(100, 1_800.0, 1_900.0) };
        assert_eq!(policy.classify(&i), Some(OpportunityCategory::C));
        i.price_per_m2 = Some(2_500.0);
        assert_eq!(policy.classify(&i), Some(OpportunityCategory::D));
        i.score = 39;
        assert_eq!(policy.classify(&i), None);
    }

    #[test]
    fn score_policy_a_needs_two_drops() {
        let i = CategoryInputs {
            drops: PriceDrops { count: 1, total_percent: 15.0 },
            reduction_from_original_pct: Some(15.0),
            ..inputs(200, 4_000.0, 4_000.0)
        };
        assert_eq!(ScoreThresholdPolicy::default().classify(&i), None);
        assert_eq!(BenchmarkDrivenPolicy::default().classify(&i), Some(OpportunityCategory::A));
    }

    #[test]
    fn classification_is_deterministic() {
        let i = CategoryInputs { score: 45, ..inputs(45, 2_100.0, 2_300.0) };
        let policy = ScoreThresholdPolicy::default();
        assert_eq!(policy.classify(&i), policy.classify(&i));
    }

    #[test]
    fn catalog_names() {
        let catalog = CategoryCatalog::default();
        assert_eq!(catalog.name(OpportunityCategory::A), "Estagnado");
        assert_eq!(catalog.info(OpportunityCategory::D).unwrap().min_score, 40);
    }
}
