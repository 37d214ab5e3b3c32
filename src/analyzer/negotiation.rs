use crate::types::{Confidence, NegotiationEstimate, PriceDrops, PriceHistoryEntry};

const BASE_DISCOUNT_CAP: f64 = 25.0;
const MAX_DISCOUNT_CAP: f64 = 35.0;
/// Premium over the zone average (percent) that signals room to negotiate.
const PREMIUM_THRESHOLD_PCT: f64 = 15.0;

/// Discount room from time on market, past price cuts and premium over the zone.
/// Each signal contributes at most one tier; the sum is capped.
pub fn estimate_negotiation(
    days_on_market: i64,
    history: &[PriceHistoryEntry],
    price_per_m2: Option<f64>,
    market_avg_price_m2: Option<f64>,
) -> NegotiationEstimate {
    let mut factors = Vec::new();
    let mut base = 0.0;
    let mut max = 0.0;

    if days_on_market > 365 {
        base += 10.0;
        max += 20.0;
        factors.push("Over a year on the market".to_string());
    } else if days_on_market > 180 {
        base += 7.0;
        max += 15.0;
        factors.push("Over six months on the market".to_string());
    } else if days_on_market > 90 {
        base += 3.0;
        max += 8.0;
        factors.push("Over three months on the market".to_string());
    }

    let drops = PriceDrops::from_history(history);
    if drops.count >= 3 {
        base += 5.0;
        max += 10.0;
        factors.push(format!("{} previous price reductions", drops.count));
    } else if drops.count >= 1 {
        base += 2.0;
        max += 5.0;
        factors.push("Previous price reduction".to_string());
    }

    if let (Some(ppm2), Some(avg)) = (price_per_m2, market_avg_price_m2) {
        if avg > 0.0 && ppm2 > avg {
            let premium = (ppm2 - avg) / avg * 100.0;
            if premium > PREMIUM_THRESHOLD_PCT {
                base += 5.0;
                max += 10.0;
                factors.push(format!("{premium:.0}% above the zone average"));
            }
        }
    }

    let confidence = match factors.len() {
        n if n >= 3 => Confidence::High,
        2 => Confidence::Medium,
        _ => Confidence::Low,
    };

    NegotiationEstimate {
        base_discount_percent: f64::min(base, BASE_DISCOUNT_CAP),
        max_discount_percent: f64::min(max, MAX_DISCOUNT_CAP),
        factors,
        confidence,
    }
}
