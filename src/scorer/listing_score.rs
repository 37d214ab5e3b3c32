use crate::types::{ListingMetrics, PriceDrops};

/// Listing-scoped score from time on market, price cuts and discount vs the
/// zone average. Capped at 100; the category is left for the caller's policy.
pub fn score_listing_metrics(
    days_on_market: i64,
    drops: PriceDrops,
    price_per_m2: Option<f64>,
    market_avg_price_m2: Option<f64>,
) -> ListingMetrics {
    let mut score = 0;
    let mut reasons = Vec::new();

    match days_on_market {
        d if d >= 365 => {
            score += 25;
            reasons.push(format!("Stagnant: {d} days on the market"));
        }
        d if d >= 180 => {
            score += 20;
            reasons.push(format!("Long time on the market: {d} days"));
        }
        d if d >= 90 => {
            score += 10;
            reasons.push(format!("{d} days on the market"));
        }
        _ => {}
    }

    if drops.count > 0 {
        score += match drops.count {
            n if n >= 3 => 25,
            2 => 20,
            _ => 10,
        };
        reasons.push(format!(
            "{} price reduction(s), {:.1}% in total",
            drops.count, drops.total_percent
        ));
    }

    let market_avg = market_avg_price_m2.filter(|&avg| avg > 0.0);
    let discount_vs_market = match (price_per_m2, market_avg) {
        (Some(ppm2), Some(avg)) => Some((avg - ppm2) / avg * 100.0),
        _ => None,
    };
    if let Some(discount) = discount_vs_market {
        let points = match discount {
            d if d >= 20.0 => 30,
            d if d >= 15.0 => 25,
            d if d >= 10.0 => 20,
            d if d >= 5.0 => 10,
            _ => 0,
        };
        if points > 0 {
            score += points;
            reasons.push(format!("{discount:.1}% below the market average"));
        }
    }

    let mut negotiation_potential = 0;
    if days_on_market >= 180 {
        negotiation_potential += 10;
    }
    if drops.count >= 2 {
        negotiation_potential += 10;
    }
    if negotiation_potential > 0 {
        score += negotiation_potential;
        reasons.push("Strong negotiation potential".to_string());
    }

    ListingMetrics {
        score: score.min(100),
        category: None,
        reasons,
        market_avg_price_m2: market_avg,
        discount_vs_market,
        negotiation_potential,
    }
}
