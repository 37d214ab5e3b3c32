use std::collections::BTreeMap;

use crate::config::UNKNOWN_DISTANCE_KM;
use crate::types::ValueDriverImpact;

/// Radius of full effect and the valuation uplift at full effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverReach {
    pub radius_km: f64,
    pub max_impact: f64,
}

impl DriverReach {
    /// Full impact up to the radius, linear decay to zero at twice the radius.
    /// Zero-radius drivers are zone-wide: they apply only at distance 0.
    pub fn impact_at(&self, distance_km: f64) -> f64 {
        if distance_km <= self.radius_km {
            self.max_impact
        } else if self.radius_km > 0.0 && distance_km <= self.radius_km * 2.0 {
            self.max_impact * (1.0 - (distance_km - self.radius_km) / self.radius_km)
        } else {
            0.0
        }
    }
}

/// Driver name → reach and weight. Injected into [`ValueDriverModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriverTable {
    drivers: BTreeMap<String, DriverReach>,
}

impl DriverTable {
    pub fn new(drivers: impl IntoIterator<Item = (String, DriverReach)>) -> Self {
        Self { drivers: drivers.into_iter().collect() }
    }

    pub fn get(&self, name: &str) -> Option<&DriverReach> {
        self.drivers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}

impl Default for DriverTable {
    fn default() -> Self {
        let reach = |radius_km, max_impact| DriverReach { radius_km, max_impact };
        Self::new([
            ("hospital".to_string(), reach(1.0, 0.05)),
            ("universidade".to_string(), reach(0.8, 0.08)),
            ("metro".to_string(), reach(0.5, 0.10)),
            ("comboio".to_string(), reach(0.8, 0.06)),
            ("escola_top".to_string(), reach(1.0, 0.07)),
            ("centro_comercial".to_string(), reach(0.5, 0.03)),
            ("parque".to_string(), reach(0.3, 0.04)),
            ("rio".to_string(), reach(0.5, 0.08)),
            ("reabilitacao_urbana".to_string(), reach(0.0, 0.15)),
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueDriverModel {
    table: DriverTable,
}

impl ValueDriverModel {
    pub fn new(table: DriverTable) -> Self {
        Self { table }
    }

    /// Impact of every known driver given distances to their nearest instance.
    /// Drivers absent from `distances` are treated as far away. Impacts add up.
    pub fn impact(&self, distances: &BTreeMap<String, f64>) -> ValueDriverImpact {
        let impacts: BTreeMap<String, f64> = self
            .table
            .drivers
            .iter()
            .map(|(name, reach)| {
                let distance = distances.get(name).copied().unwrap_or(UNKNOWN_DISTANCE_KM);
                (name.clone(), reach.impact_at(distance))
            })
            .collect();
        let total = impacts.values().sum();
        ValueDriverImpact { impacts, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distances(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn boundary_at_radius_is_inclusive_and_twice_radius_is_zero() {
        let metro = DriverTable::default().get("metro").copied().unwrap();
        assert_eq!(metro.impact_at(0.5), 0.10);
        assert!(metro.impact_at(1.0).abs() < 1e-12);
        assert!((metro.impact_at(0.75) - 0.05).abs() < 1e-12);
        assert_eq!(metro.impact_at(1.2), 0.0);
    }

    #[test]
    fn zone_wide_driver_only_applies_inside_zone() {
        let zone = DriverTable::default().get("reabilitacao_urbana").copied().unwrap();
        assert_eq!(zone.impact_at(0.0), 0.15);
        assert_eq!(zone.impact_at(0.01), 0.0);
    }

    #[test]
    fn total_is_additive_and_missing_drivers_are_zero() {
        let model = ValueDriverModel::default();
        let result = model.impact(&distances(&[("metro", 0.2), ("rio", 0.5), ("parque", 5.0)]));
        assert_eq!(result.impacts["metro"], 0.10);
        assert_eq!(result.impacts["rio"], 0.08);
        assert_eq!(result.impacts["parque"], 0.0);
        assert_eq!(result.impacts["hospital"], 0.0);
        assert!((result.total - 0.18).abs() < 1e-12);
        assert_eq!(result.impacts.len(), DriverTable::default().names().count());
    }

    #[test]
    fn custom_table_is_honoured() {
        let model = ValueDriverModel::new(DriverTable::new([(
            "ferry".to_string(),
            DriverReach { radius_km: 1.0, max_impact: 0.2 },
        )]));
        let result = model.impact(&distances(&[("ferry", 1.5), ("metro", 0.1)]));
        assert_eq!(result.impacts.len(), 1);
        assert!((result.total - 0.1).abs() < 1e-12);
    }
}
