use crate::error::{AppError, Result};

/// Channel capacity for the ingest and rescore queues.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Default full scoring pass interval (seconds).
pub const SCORER_INTERVAL_SECS: u64 = 300;

/// Default status sweep interval (seconds).
pub const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Listings not seen by any producer for this many days become inactive.
pub const STALE_AFTER_DAYS: u64 = 14;

/// Maximum comparables kept per target listing.
pub const MAX_COMPARABLES: usize = 12;

/// Comparables used for the condition-adjusted fair price.
pub const FAIR_PRICE_COMPARABLES: usize = 6;

/// Minimum similarity a candidate must exceed to count as a comparable.
pub const MIN_SIMILARITY: f64 = 0.5;

/// Distance assumed when either side of a pair has no coordinates.
pub const UNKNOWN_DISTANCE_KM: f64 = 999.0;

/// Benchmark snapshots kept per (parish, municipality, typology); older ones are pruned.
pub const BENCHMARK_SNAPSHOTS_KEPT: i64 = 288;

pub const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// Curated shortlist: score floor and size.
pub mod curation {
    pub const MIN_SCORE: i64 = 70;
    pub const MAX_LISTINGS: i64 = 12;
}

/// Score at which a listing first triggers a `high_score` alert.
pub const ALERT_MIN_SCORE: i64 = 70;

/// Default page size for listing and alert queries.
pub mod paging {
    pub const LISTINGS_LIMIT: i64 = 100;
    pub const ALERTS_LIMIT: i64 = 50;
    pub const BENCHMARKS_LIMIT: i64 = 30;
}

/// Which scoring formula and category policy the engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPath {
    /// Five-factor composite score, benchmark-driven categories.
    Opportunity,
    /// Listing-scoped score, score-threshold categories.
    Listing,
}

impl std::str::FromStr for ScoringPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "opportunity" => Ok(ScoringPath::Opportunity),
            "listing" => Ok(ScoringPath::Listing),
            other => Err(AppError::Config(format!(
                "SCORING_PATH must be 'opportunity' or 'listing', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ScoringPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringPath::Opportunity => write!(f, "opportunity"),
            ScoringPath::Listing => write!(f, "listing"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// JSON batch of listings loaded once at startup, a file path or http(s) URL (INGEST_PATH)
    pub ingest_path: Option<String>,
    /// Seconds between full scoring passes (SCORER_INTERVAL_SECS)
    pub scorer_interval_secs: u64,
    /// Seconds between stale-listing sweeps (SWEEP_INTERVAL_SECS)
    pub sweep_interval_secs: u64,
    /// Days without a sighting before a listing is marked inactive (STALE_AFTER_DAYS)
    pub stale_after_days: u64,
    /// Comparables kept per target (MAX_COMPARABLES)
    pub max_comparables: usize,
    /// SCORING_PATH: "opportunity" or "listing"
    pub scoring_path: ScoringPath,
    /// Score crossing that raises a high_score alert (ALERT_MIN_SCORE)
    pub alert_min_score: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "listings.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            ingest_path: std::env::var("INGEST_PATH")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            scorer_interval_secs: std::env::var("SCORER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .unwrap_or(SCORER_INTERVAL_SECS),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .unwrap_or(SWEEP_INTERVAL_SECS),
            stale_after_days: std::env::var("STALE_AFTER_DAYS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(STALE_AFTER_DAYS),
            max_comparables: std::env::var("MAX_COMPARABLES")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(MAX_COMPARABLES),
            scoring_path: std::env::var("SCORING_PATH")
                .unwrap_or_else(|_| "opportunity".to_string())
                .parse::<ScoringPath>()?,
            alert_min_score: std::env::var("ALERT_MIN_SCORE")
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(ALERT_MIN_SCORE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_path_parses_case_insensitively() {
        assert_eq!("Listing".parse::<ScoringPath>().unwrap(), ScoringPath::Listing);
        assert_eq!(" opportunity ".parse::<ScoringPath>().unwrap(), ScoringPath::Opportunity);
        assert!("composite".parse::<ScoringPath>().is_err());
    }
}
