use crate::types::{OpportunityScore, Typology, ZoneDrivers};

const AMENITY_BONUS_MIN: usize = 5;
const DRIVER_POINTS: i64 = 3;
const DRIVER_POINTS_CAP: i64 = 10;
const RISK_PENALTY: i64 = 3;
const RISK_FLOOR: i64 = -15;

/// Inputs of the five-factor score, already reduced to plain numbers.
#[derive(Debug, Clone)]
pub struct OpportunityInputs<'a> {
    pub typology: &'a str,
    pub days_on_market: i64,
    pub reduction_from_original_pct: Option<f64>,
    /// Signed; negative when cheaper than the benchmark average.
    pub vs_benchmark_pct: Option<f64>,
    pub intervention_drivers: usize,
    pub zone_drivers: &'a ZoneDrivers,
    pub risks: usize,
    pub condition: &'a str,
    pub year_built: Option<i32>,
}

/// Composite score in [0, 100]. The category is left unset; the caller
/// classifies with its own policy.
pub fn score_opportunity(inputs: &OpportunityInputs<'_>) -> OpportunityScore {
    let mut reasons = Vec::new();

    let inefficiency = inefficiency_score(
        inputs.days_on_market,
        inputs.reduction_from_original_pct,
        &mut reasons,
    );
    let valuation =
        valuation_score(inputs.vs_benchmark_pct, inputs.intervention_drivers, &mut reasons);
    let liquidity = liquidity_score(Typology::parse(inputs.typology), inputs.zone_drivers);
    let risk = risk_score(inputs.risks, &mut reasons);
    let quality = quality_score(inputs.condition, inputs.year_built);

    let total = (inefficiency + valuation + liquidity + risk + quality).clamp(0, 100);

    OpportunityScore {
        inefficiency,
        valuation,
        liquidity,
        risk,
        quality,
        total,
        category: None,
        reasons,
    }
}

pub(crate) fn inefficiency_score(
    days: i64,
    reduction_pct: Option<f64>,
    reasons: &mut Vec<String>,
) -> i64 {
    let mut score = match days {
        d if d >= 365 => 30,
        d if d >= 180 => 25,
        d if d >= 90 => 15,
        d if d >= 30 => 8,
        _ => 0,
    };
    if days >= 90 {
        reasons.push(format!("{days} days on the market"));
    }

    if let Some(reduction) = reduction_pct {
        score += match reduction {
            r if r >= 20.0 => 15,
            r if r >= 10.0 => 10,
            r if r >= 5.0 => 5,
            _ => 0,
        };
        if reduction >= 5.0 {
            reasons.push(format!("{reduction:.1}% below the original asking price"));
        }
    }

    score.min(30)
}

pub(crate) fn valuation_score(
    vs_benchmark_pct: Option<f64>,
    intervention_drivers: usize,
    reasons: &mut Vec<String>,
) -> i64 {
    let mut score = 0;

    if let Some(diff) = vs_benchmark_pct {
        score += match diff {
            d if d <= -20.0 => 25,
            d if d <= -15.0 => 20,
            d if d <= -10.0 => 15,
            d if d <= -5.0 => 10,
            _ => 0,
        };
        if diff <= -5.0 {
            reasons.push(format!("{:.1}% below the zone average", -diff));
        }
    }

    if intervention_drivers > 0 {
        let driver_points = (intervention_drivers as i64 * DRIVER_POINTS).min(DRIVER_POINTS_CAP);
        score += driver_points;
        reasons.push(format!("{intervention_drivers} intervention driver(s)"));
    }

    score.min(25)
}

pub(crate) fn liquidity_score(typology: Typology, zone: &ZoneDrivers) -> i64 {
    let mut score: i64 = 15;
    score += match typology {
        Typology::T1 | Typology::T2 | Typology::T3 => 3,
        Typology::T0 => 1,
        _ => -2,
    };
    if zone.amenity_count() >= AMENITY_BONUS_MIN {
        score += 2;
    }
    score.clamp(0, 20)
}

pub(crate) fn risk_score(risks: usize, reasons: &mut Vec<String>) -> i64 {
    if risks > 0 {
        reasons.push(format!("{risks} risk factor(s) identified"));
    }
    (-(risks as i64) * RISK_PENALTY).max(RISK_FLOOR)
}

pub(crate) fn quality_score(condition: &str, year_built: Option<i32>) -> i64 {
    let mut score = 5;
    if condition.to_lowercase().contains("novo") {
        score += 3;
    }
    if year_built.is_some_and(|y| y >= 2000) {
        score += 2;
    }
    score.min(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(amenities: usize) -> ZoneDrivers {
        ZoneDrivers {
            transport: (0..amenities).map(|i| format!("metro {i}")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn stagnant_discounted_flat_scores_high() {
        let z = zone(5);
        let score = score_opportunity(&OpportunityInputs {
            typology: "T2",
            days_on_market: 195,
            reduction_from_original_pct: Some(11.0),
            vs_benchmark_pct: Some(-11.8),
            intervention_drivers: 1,
            zone_drivers: &z,
            risks: 1,
            condition: "usado",
            year_built: Some(1960),
        });
        // 25 + 10 capped at 30; 15 + 3; 15 + 3 + 2; -3; 5
        assert_eq!(score.inefficiency, 30);
        assert_eq!(score.valuation, 18);
        assert_eq!(score.liquidity, 20);
        assert_eq!(score.risk, -3);
        assert_eq!(score.quality, 5);
        assert_eq!(score.total, 70);
        assert!(score.category.is_none());
        assert!(score.reasons.iter().any(|r| r.contains("195 days")));
    }

    #[test]
    fn inefficiency_is_capped() {
        let mut reasons = Vec::new();
        assert_eq!(inefficiency_score(400, Some(25.0), &mut reasons), 30);
        assert_eq!(inefficiency_score(29, None, &mut reasons), 0);
        assert_eq!(inefficiency_score(30, Some(4.9), &mut reasons), 8);
    }

    #[test]
    fn valuation_driver_part_is_capped() {
        let mut reasons = Vec::new();
        assert_eq!(valuation_score(None, 5, &mut reasons), 10);
        assert_eq!(valuation_score(Some(-25.0), 5, &mut reasons), 25);
        assert_eq!(valuation_score(Some(3.0), 0, &mut reasons), 0);
    }

    #[test]
    fn liquidity_depends_on_typology_and_amenities() {
        assert_eq!(liquidity_score(Typology::T0, &zone(0)), 16);
        assert_eq!(liquidity_score(Typology::Moradia, &zone(0)), 13);
        assert_eq!(liquidity_score(Typology::T3, &zone(6)), 20);
    }

    #[test]
    fn risk_floor() {
        let mut reasons = Vec::new();
        assert_eq!(risk_score(0, &mut reasons), 0);
        assert!(reasons.is_empty());
        assert_eq!(risk_score(9, &mut reasons), -15);
    }

    #[test]
    fn quality_rewards_new_and_recent() {
        assert_eq!(quality_score("Novo", Some(2015)), 10);
        assert_eq!(quality_score("bom", Some(1999)), 5);
        assert_eq!(quality_score("", None), 5);
    }

    #[test]
    fn total_never_negative() {
        let z = zone(0);
        let score = score_opportunity(&OpportunityInputs {
            typology: "Terreno",
            days_on_market: 0,
            reduction_from_original_pct: None,
            vs_benchmark_pct: Some(40.0),
            intervention_drivers: 0,
            zone_drivers: &z,
            risks: 10,
            condition: "ruina",
            year_built: None,
        });
        assert!((0..=100).contains(&score.total));
        assert_eq!(score.total, 13 - 15 + 5);
    }
}
