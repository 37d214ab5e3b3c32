use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Listing status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
    Sold,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ListingStatus::Active => "active",
            ListingStatus::Inactive => "inactive",
            ListingStatus::Sold => "sold",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ListingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ListingStatus::Active),
            "inactive" => Ok(ListingStatus::Inactive),
            "sold" => Ok(ListingStatus::Sold),
            other => Err(AppError::InvalidListing(format!("unknown status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Opportunity category
// ---------------------------------------------------------------------------

/// Rule-derived opportunity label. "Unscored" is `Option::<OpportunityCategory>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpportunityCategory {
    /// Stagnant: long on the market with a meaningful price cut.
    A,
    /// Aggressively priced on entry.
    B,
    /// Below market with intervention potential.
    C,
    /// Everything else worth keeping.
    D,
}

impl OpportunityCategory {
    pub const ALL: [OpportunityCategory; 4] = [
        OpportunityCategory::A,
        OpportunityCategory::B,
        OpportunityCategory::C,
        OpportunityCategory::D,
    ];

    pub fn code(self) -> &'static str {
        match self {
            OpportunityCategory::A => "A",
            OpportunityCategory::B => "B",
            OpportunityCategory::C => "C",
            OpportunityCategory::D => "D",
        }
    }
}

impl std::fmt::Display for OpportunityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for OpportunityCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(OpportunityCategory::A),
            "B" => Ok(OpportunityCategory::B),
            "C" => Ok(OpportunityCategory::C),
            "D" => Ok(OpportunityCategory::D),
            other => Err(AppError::InvalidListing(format!("unknown category '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Typology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Typology {
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    Moradia,
    Predio,
    Loja,
    Armazem,
    Terreno,
    /// Anything we don't recognize, including "Atípico".
    Other,
}

impl Typology {
    /// Lenient parse: unknown labels map to `Other` rather than failing.
    pub fn parse(label: &str) -> Self {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "t0" => Typology::T0,
            "t1" => Typology::T1,
            "t2" => Typology::T2,
            "t3" => Typology::T3,
            "t4" => Typology::T4,
            "t5" => Typology::T5,
            "moradia" => Typology::Moradia,
            "predio" | "prédio" => Typology::Predio,
            "loja" => Typology::Loja,
            "armazem" | "armazém" => Typology::Armazem,
            "terreno" => Typology::Terreno,
            _ => Typology::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Amenities listed for a listing's zone, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneDrivers {
    pub transport: Vec<String>,
    pub health: Vec<String>,
    pub education: Vec<String>,
    pub commerce: Vec<String>,
    pub urban_projects: Vec<String>,
    pub notes: String,
}

impl ZoneDrivers {
    /// Amenity entries that count toward exit liquidity.
    pub fn amenity_count(&self) -> usize {
        self.transport.len() + self.health.len() + self.education.len() + self.commerce.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub portal: String,
    pub url: String,
    pub title: String,
    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub typology: String,
    pub location: String,
    pub parish: String,
    pub municipality: String,
    pub district: String,
    pub condition: String,
    pub year_built: Option<i32>,
    pub description: String,
    pub features: Vec<String>,
    pub photos: Vec<String>,
    pub contact: BTreeMap<String, String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Driver name → straight-line distance in km to its nearest instance.
    pub driver_distances: BTreeMap<String, f64>,
    pub zone_drivers: ZoneDrivers,
    pub intervention_drivers: Vec<String>,
    pub risks: Vec<String>,
    pub days_on_market: i64,
    pub opportunity_score: i64,
    pub opportunity_category: Option<OpportunityCategory>,
    pub status: ListingStatus,
    pub scored_at: Option<i64>,
    /// Nanosecond UTC epoch timestamps, owned by the store.
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen: i64,
}

impl Listing {
    /// Every container field starts empty and owned by this record.
    pub fn new(id: impl Into<String>, portal: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            portal: portal.into(),
            url: url.into(),
            title: String::new(),
            price: None,
            area_m2: None,
            typology: String::new(),
            location: String::new(),
            parish: String::new(),
            municipality: String::new(),
            district: "Lisboa".to_string(),
            condition: String::new(),
            year_built: None,
            description: String::new(),
            features: Vec::new(),
            photos: Vec::new(),
            contact: BTreeMap::new(),
            latitude: None,
            longitude: None,
            driver_distances: BTreeMap::new(),
            zone_drivers: ZoneDrivers::default(),
            intervention_drivers: Vec::new(),
            risks: Vec::new(),
            days_on_market: 0,
            opportunity_score: 0,
            opportunity_category: None,
            status: ListingStatus::Active,
            scored_at: None,
            created_at: 0,
            updated_at: 0,
            last_seen: 0,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_area(mut self, area_m2: f64) -> Self {
        self.area_m2 = Some(area_m2);
        self
    }

    pub fn with_typology(mut self, typology: impl Into<String>) -> Self {
        self.typology = typology.into();
        self
    }

    pub fn with_zone(mut self, parish: impl Into<String>, municipality: impl Into<String>) -> Self {
        self.parish = parish.into();
        self.municipality = municipality.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_days_on_market(mut self, days: i64) -> Self {
        self.days_on_market = days;
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// price / area_m2 when both are present and area is positive; undefined otherwise.
    pub fn price_per_m2(&self) -> Option<f64> {
        match (self.price, self.area_m2) {
            (Some(price), Some(area)) if area > 0.0 => Some(price / area),
            _ => None,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub listing_id: String,
    pub price: f64,
    pub change_percent: f64,
    pub recorded_at: i64,
}

/// Price-drop signals derived from a listing's history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceDrops {
    pub count: usize,
    /// Sum of the absolute percentages of every drop.
    pub total_percent: f64,
}

impl PriceDrops {
    pub fn from_history(history: &[PriceHistoryEntry]) -> Self {
        history
            .iter()
            .filter(|h| h.change_percent < 0.0)
            .fold(PriceDrops::default(), |acc, h| PriceDrops {
                count: acc.count + 1,
                total_percent: acc.total_percent + h.change_percent.abs(),
            })
    }
}

/// Percentage cut from the first recorded price to `current`, when it is a cut.
pub fn reduction_from_original(history: &[PriceHistoryEntry], current: Option<f64>) -> Option<f64> {
    let original = history.first()?.price;
    let current = current?;
    if original > 0.0 && original > current {
        Some((original - current) / original * 100.0)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Comparables and benchmarks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparable {
    pub id: String,
    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub price_per_m2: f64,
    pub parish: String,
    pub distance_km: f64,
    pub days_on_market: i64,
    pub condition: String,
    /// Similarity to the target, in [0, 1].
    pub similarity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBenchmark {
    pub parish: String,
    pub municipality: String,
    pub typology: String,
    pub avg_price_m2: f64,
    pub median_price_m2: f64,
    pub min_price_m2: f64,
    pub max_price_m2: f64,
    pub stdev_price_m2: f64,
    pub sample_size: i64,
    /// Placeholders until historical series exist.
    pub trend_6m: f64,
    pub trend_12m: f64,
    /// Set once persisted.
    pub recorded_at: Option<i64>,
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueDriverImpact {
    pub impacts: BTreeMap<String, f64>,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    #[serde(rename = "alta")]
    High,
    #[serde(rename = "média")]
    Medium,
    #[serde(rename = "baixa")]
    Low,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::High => "alta",
            Confidence::Medium => "média",
            Confidence::Low => "baixa",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NegotiationEstimate {
    pub base_discount_percent: f64,
    pub max_discount_percent: f64,
    pub factors: Vec<String>,
    pub confidence: Confidence,
}

/// Five-factor composite score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityScore {
    /// 0..=30
    pub inefficiency: i64,
    /// 0..=25
    pub valuation: i64,
    /// 0..=20
    pub liquidity: i64,
    /// -15..=0
    pub risk: i64,
    /// 0..=10
    pub quality: i64,
    /// 0..=100
    pub total: i64,
    pub category: Option<OpportunityCategory>,
    pub reasons: Vec<String>,
}

/// Listing-scoped score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingMetrics {
    pub score: i64,
    pub category: Option<OpportunityCategory>,
    pub reasons: Vec<String>,
    pub market_avg_price_m2: Option<f64>,
    /// Positive when the listing is cheaper than the market average.
    pub discount_vs_market: Option<f64>,
    pub negotiation_potential: i64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PriceDrop,
    NewOpportunity,
    HighScore,
    /// Raised by an external caller through the API.
    Manual,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::PriceDrop => "price_drop",
            AlertType::NewOpportunity => "new_opportunity",
            AlertType::HighScore => "high_score",
            AlertType::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

impl AlertType {
    /// Unknown stored labels read back as `Manual`.
    pub fn parse(s: &str) -> Self {
        match s {
            "price_drop" => AlertType::PriceDrop,
            "new_opportunity" => AlertType::NewOpportunity,
            "high_score" => AlertType::HighScore,
            _ => AlertType::Manual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: i64,
    pub listing_id: String,
    pub alert_type: AlertType,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Nanosecond UTC epoch.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(price: f64, change_percent: f64) -> PriceHistoryEntry {
        PriceHistoryEntry {
            id: 0,
            listing_id: "l1".to_string(),
            price,
            change_percent,
            recorded_at: 0,
        }
    }

    #[test]
    fn price_per_m2_requires_positive_area() {
        let l = Listing::new("l1", "idealista", "https://x/1").with_price(300_000.0);
        assert_eq!(l.price_per_m2(), None);
        assert_eq!(l.clone().with_area(0.0).price_per_m2(), None);
        assert_eq!(l.with_area(100.0).price_per_m2(), Some(3_000.0));
    }

    #[test]
    fn new_listing_owns_empty_containers() {
        let mut a = Listing::new("a", "p", "u1");
        let b = Listing::new("b", "p", "u2");
        a.features.push("varanda".to_string());
        assert!(b.features.is_empty());
        assert!(b.photos.is_empty() && b.contact.is_empty());
        assert_eq!(b.district, "Lisboa");
    }

    #[test]
    fn drops_and_reduction_from_history() {
        let history = vec![entry(400_000.0, 0.0), entry(390_000.0, -2.5), entry(356_000.0, -8.72)];
        let drops = PriceDrops::from_history(&history);
        assert_eq!(drops.count, 2);
        assert!((drops.total_percent - 11.22).abs() < 1e-9);

        let reduction = reduction_from_original(&history, Some(356_000.0)).unwrap();
        assert!((reduction - 11.0).abs() < 1e-9);
        assert!(reduction_from_original(&history, Some(410_000.0)).is_none());
        assert!(reduction_from_original(&[], Some(1.0)).is_none());
    }

    #[test]
    fn typology_parse_is_lenient() {
        assert_eq!(Typology::parse("t2"), Typology::T2);
        assert_eq!(Typology::parse("Prédio"), Typology::Predio);
        assert_eq!(Typology::parse("T7+"), Typology::Other);
    }

    #[test]
    fn category_round_trips_through_code() {
        for cat in OpportunityCategory::ALL {
            assert_eq!(cat.code().parse::<OpportunityCategory>().unwrap(), cat);
        }
    }
}
