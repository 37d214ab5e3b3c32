//! Row types matching `migrations/0001_init.sql`, and their conversion into
//! domain records. JSON text columns that fail to parse read back as empty.

use serde::de::DeserializeOwned;

use crate::types::{
    Alert, AlertType, Listing, ListingStatus, MarketBenchmark, OpportunityCategory,
    PriceHistoryEntry,
};

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRow {
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
    pub features: String,
    pub photos: String,
    pub contact: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub driver_distances: String,
    pub zone_drivers: String,
    pub intervention_drivers: String,
    pub risks: String,
    pub days_on_market: i64,
    pub opportunity_score: i64,
    pub opportunity_category: Option<String>,
    pub status: String,
    pub scored_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen: i64,
}

fn json_or_default<T: DeserializeOwned + Default>(text: &str) -> T {
    serde_json::from_str(text).unwrap_or_default()
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Listing {
            features: json_or_default(&row.features),
            photos: json_or_default(&row.photos),
            contact: json_or_default(&row.contact),
            driver_distances: json_or_default(&row.driver_distances),
            zone_drivers: json_or_default(&row.zone_drivers),
            intervention_drivers: json_or_default(&row.intervention_drivers),
            risks: json_or_default(&row.risks),
            opportunity_category: row
                .opportunity_category
                .as_deref()
                .and_then(|c| c.parse::<OpportunityCategory>().ok()),
            status: row.status.parse::<ListingStatus>().unwrap_or_default(),
            id: row.id,
            portal: row.portal,
            url: row.url,
            title: row.title,
            price: row.price,
            area_m2: row.area_m2,
            typology: row.typology,
            location: row.location,
            parish: row.parish,
            municipality: row.municipality,
            district: row.district,
            condition: row.condition,
            year_built: row.year_built,
            description: row.description,
            latitude: row.latitude,
            longitude: row.longitude,
            days_on_market: row.days_on_market,
            opportunity_score: row.opportunity_score,
            scored_at: row.scored_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_seen: row.last_seen,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PriceHistoryRow {
    pub id: i64,
    pub listing_id: String,
    pub price: f64,
    pub change_percent: f64,
    pub recorded_at: i64,
}

impl From<PriceHistoryRow> for PriceHistoryEntry {
    fn from(row: PriceHistoryRow) -> Self {
        PriceHistoryEntry {
            id: row.id,
            listing_id: row.listing_id,
            price: row.price,
            change_percent: row.change_percent,
            recorded_at: row.recorded_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct BenchmarkRow {
    pub parish: String,
    pub municipality: String,
    pub typology: String,
    pub avg_price_m2: f64,
    pub median_price_m2: f64,
    pub min_price_m2: f64,
    pub max_price_m2: f64,
    pub stdev_price_m2: f64,
    pub sample_size: i64,
    pub trend_6m: f64,
    pub trend_12m: f64,
    pub recorded_at: i64,
}

impl From<BenchmarkRow> for MarketBenchmark {
    fn from(row: BenchmarkRow) -> Self {
        MarketBenchmark {
            parish: row.parish,
            municipality: row.municipality,
            typology: row.typology,
            avg_price_m2: row.avg_price_m2,
            median_price_m2: row.median_price_m2,
            min_price_m2: row.min_price_m2,
            max_price_m2: row.max_price_m2,
            stdev_price_m2: row.stdev_price_m2,
            sample_size: row.sample_size,
            trend_6m: row.trend_6m,
            trend_12m: row.trend_12m,
            recorded_at: Some(row.recorded_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub listing_id: String,
    pub alert_type: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
}

impl From<AlertRow> for Alert {
    fn from(row: AlertRow) -> Self {
        Alert {
            id: row.id,
            listing_id: row.listing_id,
            alert_type: AlertType::parse(&row.alert_type),
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}
