use std::collections::BTreeMap;

use crate::types::Comparable;

/// Condition label → price multiplier relative to "bom".
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionTable {
    multipliers: BTreeMap<String, f64>,
}

impl ConditionTable {
    pub fn new(multipliers: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            multipliers: multipliers
                .into_iter()
                .map(|(label, m)| (normalize_label(&label), m))
                .collect(),
        }
    }

    /// Unknown labels are neutral.
    pub fn multiplier(&self, condition: &str) -> f64 {
        self.multipliers.get(&normalize_label(condition)).copied().unwrap_or(1.0)
    }
}

impl Default for ConditionTable {
    fn default() -> Self {
        Self::new([
            ("novo".to_string(), 1.15),
            ("excelente".to_string(), 1.10),
            ("bom".to_string(), 1.00),
            ("razoavel".to_string(), 0.90),
            ("para_renovar".to_string(), 0.75),
            ("ruina".to_string(), 0.50),
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceAdjuster {
    table: ConditionTable,
}

impl PriceAdjuster {
    pub fn new(table: ConditionTable) -> Self {
        Self { table }
    }

    /// The comparable's price/m² restated as if it were in `target_condition`.
    pub fn adjust(&self, comparable: &Comparable, target_condition: &str) -> f64 {
        let comp_mult = self.table.multiplier(&comparable.condition);
        let target_mult = self.table.multiplier(target_condition);
        comparable.price_per_m2 * (target_mult / comp_mult)
    }
}

/// Lowercase, strip Portuguese accents, join words with underscores.
/// "Para Renovar" and "para-renovar" both become "para_renovar".
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(ppm2: f64, condition: &str) -> Comparable {
        Comparable {
            id: "c".to_string(),
            price: None,
            area_m2: None,
            price_per_m2: ppm2,
            parish: String::new(),
            distance_km: 0.0,
            days_on_market: 0,
            condition: condition.to_string(),
            similarity_score: 1.0,
        }
    }

    #[test]
    fn renovated_comparable_is_discounted_for_ruin_target() {
        let adjusted = PriceAdjuster::default().adjust(&comp(4_600.0, "novo"), "ruína");
        assert!((adjusted - 4_600.0 * 0.50 / 1.15).abs() < 1e-9);
    }

    #[test]
    fn unknown_conditions_are_neutral() {
        let adjuster = PriceAdjuster::default();
        assert_eq!(adjuster.adjust(&comp(3_000.0, "???"), "bom"), 3_000.0);
        assert!((adjuster.adjust(&comp(3_000.0, "bom"), "Para Renovar") - 2_250.0).abs() < 1e-9);
    }

    #[test]
    fn labels_normalize_accents_and_separators() {
        assert_eq!(normalize_label(" Razoável "), "razoavel");
        assert_eq!(normalize_label("para-renovar"), "para_renovar");
    }
}
