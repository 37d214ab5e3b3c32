use crate::analyzer::adjustment::normalize_label;
use crate::config::{MAX_COMPARABLES, MIN_SIMILARITY, UNKNOWN_DISTANCE_KM};
use crate::types::{Comparable, Listing};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Fixed weight per similarity factor.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityWeights {
    pub typology: f64,
    pub parish: f64,
    pub area: f64,
    pub condition: f64,
    pub distance: f64,
}

impl SimilarityWeights {
    /// Sum of every weight, whether or not its factor was computable for a pair.
    pub fn total(&self) -> f64 {
        self.typology + self.parish + self.area + self.condition + self.distance
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            typology: 0.30,
            parish: 0.25,
            area: 0.20,
            condition: 0.15,
            distance: 0.10,
        }
    }
}

/// Ranks candidate listings by how well they price a target.
#[derive(Debug, Clone)]
pub struct ComparableMatcher {
    weights: SimilarityWeights,
    max_results: usize,
    min_similarity: f64,
}

impl ComparableMatcher {
    pub fn new(max_results: usize) -> Self {
        Self {
            weights: SimilarityWeights::default(),
            max_results,
            min_similarity: MIN_SIMILARITY,
        }
    }

    pub fn with_weights(mut self, weights: SimilarityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Candidates strictly above the similarity floor, best first, at most `max_results`.
    /// The target itself and candidates without a price/m² never qualify.
    pub fn find(&self, target: &Listing, candidates: &[Listing]) -> Vec<Comparable> {
        let mut comparables: Vec<Comparable> = candidates
            .iter()
            .filter(|c| c.id != target.id)
            .filter_map(|candidate| {
                let price_per_m2 = candidate.price_per_m2()?;
                let distance_km = distance_km(target, candidate);
                let similarity = self.similarity(target, candidate, distance_km);
                (similarity > self.min_similarity).then(|| Comparable {
                    id: candidate.id.clone(),
                    price: candidate.price,
                    area_m2: candidate.area_m2,
                    price_per_m2,
                    parish: candidate.parish.clone(),
                    distance_km,
                    days_on_market: candidate.days_on_market,
                    condition: candidate.condition.clone(),
                    similarity_score: similarity,
                })
            })
            .collect();

        comparables.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        comparables.truncate(self.max_results);
        comparables
    }

    /// Weighted similarity in [0, 1]. The denominator is always the full weight sum,
    /// so a pair missing an area scores at most 0.80.
    pub fn similarity(&self, target: &Listing, candidate: &Listing, distance_km: f64) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        if same_label(&target.typology, &candidate.typology) {
            score += w.typology;
        }
        if same_label(&target.parish, &candidate.parish) {
            score += w.parish;
        }
        if let (Some(ta), Some(ca)) = (target.area_m2, candidate.area_m2) {
            if ta > 0.0 && ca > 0.0 {
                let area_diff = (ta - ca).abs() / ta;
                score += w.area * (1.0 - area_diff).max(0.0);
            }
        }
        if !target.condition.trim().is_empty()
            && normalize_label(&target.condition) == normalize_label(&candidate.condition)
        {
            score += w.condition;
        }
        if distance_km < 0.5 {
            score += w.distance;
        } else if distance_km < 1.0 {
            score += w.distance * 0.5;
        }

        let total = w.total();
        if total > 0.0 {
            (score / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

impl Default for ComparableMatcher {
    fn default() -> Self {
        Self::new(MAX_COMPARABLES)
    }
}

/// Empty labels never match each other.
fn same_label(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Great-circle distance between two listings, or `UNKNOWN_DISTANCE_KM` when
/// either lacks coordinates.
pub fn distance_km(a: &Listing, b: &Listing) -> f64 {
    match (a.coordinates(), b.coordinates()) {
        (Some(p), Some(q)) => haversine_km(p, q),
        _ => UNKNOWN_DISTANCE_KM,
    }
}

pub fn haversine_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, typology: &str, parish: &str, area: f64, ppm2: f64) -> Listing {
        Listing::new(id, "idealista", format!("https://example.pt/{id}"))
            .with_typology(typology)
            .with_zone(parish, "Lisboa")
            .with_area(area)
            .with_price(area * ppm2)
            .with_condition("bom")
    }

    #[test]
    fn never_matches_target_against_itself() {
        let target = listing("t", "T2", "Arroios", 80.0, 4_000.0);
        let pool = vec![target.clone(), listing("c1", "T2", "Arroios", 80.0, 4_100.0)];
        let found = ComparableMatcher::default().find(&target, &pool);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "c1");
    }

    #[test]
    fn identical_neighbour_scores_one() {
        let target = listing("t", "T2", "Arroios", 80.0, 4_000.0).with_coordinates(38.7223, -9.1393);
        let near = listing("c1", "T2", "Arroios", 80.0, 4_100.0).with_coordinates(38.7230, -9.1390);
        let found = ComparableMatcher::default().find(&target, &[near]);
        assert!((found[0].similarity_score - 1.0).abs() < 1e-9);
        assert!(found[0].distance_km < 0.5);
    }

    #[test]
    fn missing_area_caps_similarity_below_one() {
        let target = listing("t", "T2", "Arroios", 80.0, 4_000.0);
        let mut candidate = listing("c1", "T2", "Arroios", 80.0, 4_000.0);
        candidate.area_m2 = None;
        let sim = ComparableMatcher::default().similarity(&target, &candidate, UNKNOWN_DISTANCE_KM);
        // typology + parish + condition only, over the full weight sum
        assert!((sim - 0.70).abs() < 1e-9);
    }

    #[test]
    fn filters_below_threshold_sorts_and_truncates() {
        let target = listing("t", "T2", "Arroios", 100.0, 4_000.0);
        let mut pool = Vec::new();
        for i in 0..20 {
            pool.push(listing(&format!("c{i}"), "T2", "Arroios", 100.0 + i as f64 * 3.0, 4_000.0));
        }
        // different typology and parish: 0.20 + 0.15 = 0.35, rejected
        pool.push(listing("far", "T4", "Belém", 100.0, 4_000.0));

        let found = ComparableMatcher::new(12).find(&target, &pool);
        assert_eq!(found.len(), 12);
        assert!(found.iter().all(|c| c.id != "far"));
        assert!(found.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
        assert!(found.iter().all(|c| (0.0..=1.0).contains(&c.similarity_score)));
        assert_eq!(found[0].id, "c0");
    }

    #[test]
    fn candidates_without_price_per_m2_are_skipped() {
        let target = listing("t", "T2", "Arroios", 80.0, 4_000.0);
        let mut no_price = listing("c1", "T2", "Arroios", 80.0, 4_000.0);
        no_price.price = None;
        assert!(ComparableMatcher::default().find(&target, &[no_price]).is_empty());
    }

    #[test]
    fn custom_weights_change_the_ranking() {
        let target = listing("t", "T2", "Arroios", 80.0, 4_000.0);
        // T4 in another parish: default weights leave only area + condition (0.35)
        let other = listing("c1", "T4", "Belém", 80.0, 4_000.0);
        assert!(ComparableMatcher::default().find(&target, &[other.clone()]).is_empty());

        let area_only = SimilarityWeights {
            typology: 0.0,
            parish: 0.0,
            area: 1.0,
            condition: 0.0,
            distance: 0.0,
        };
        let found = ComparableMatcher::default().with_weights(area_only).find(&target, &[other]);
        assert_eq!(found.len(), 1);
        assert!((found[0].similarity_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn haversine_known_distance() {
        // Rossio to Praça do Comércio, roughly 0.8 km
        let d = haversine_km((38.7139, -9.1394), (38.7075, -9.1364));
        assert!(d > 0.6 && d < 0.9, "d={d}");
    }
}
