use std::collections::BTreeMap;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes; unused fields are skipped)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SummaryResponse {
    pub active_listings: i64,
    pub by_category: BTreeMap<String, i64>,
    pub by_portal: BTreeMap<String, i64>,
    pub unread_alerts: i64,
    pub scoring_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingResponse {
    pub id: String,
    pub portal: String,
    pub title: String,
    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub typology: String,
    pub parish: String,
    pub days_on_market: i64,
    pub opportunity_score: i64,
    pub opportunity_category: Option<String>,
}

impl ListingResponse {
    pub fn price_per_m2(&self) -> Option<f64> {
        match (self.price, self.area_m2) {
            (Some(p), Some(a)) if a > 0.0 => Some(p / a),
            _ => None,
        }
    }

    /// Title when present, otherwise typology and parish.
    pub fn label(&self) -> String {
        if self.title.trim().is_empty() {
            format!("{} {}", self.typology, self.parish).trim().to_string()
        } else {
            self.title.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertResponse {
    pub listing_id: String,
    pub alert_type: String,
    pub message: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthResponse {
    pub engine_running: bool,
    pub last_pass_at_ns: u64,
    pub listings_scored: u64,
    pub ingest_queue_pending: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p99_us: Option<u64>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

/// Which listing set the left pane shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingView {
    Curated,
    All,
}

impl ListingView {
    pub fn toggle(self) -> Self {
        match self {
            ListingView::Curated => ListingView::All,
            ListingView::All => ListingView::Curated,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ListingView::Curated => " CURATED OPPORTUNITIES ",
            ListingView::All => " ACTIVE LISTINGS ",
        }
    }

    fn path(self) -> &'static str {
        match self {
            ListingView::Curated => "/opportunities/curated",
            ListingView::All => "/listings?limit=200",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub view: ListingView,
    pub summary: SummaryResponse,
    pub listings: Vec<ListingResponse>,
    pub alerts: Vec<AlertResponse>,
    pub health: HealthResponse,
    pub latency: LatencyResponse,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            view: ListingView::Curated,
            summary: SummaryResponse::default(),
            listings: Vec::new(),
            alerts: Vec::new(),
            health: HealthResponse::default(),
            latency: LatencyResponse::default(),
            base_url,
        }
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let summary_url = format!("{}/stats/summary", self.base_url);
        let listings_url = format!("{}{}", self.base_url, self.view.path());
        let alerts_url = format!("{}/alerts?limit=50", self.base_url);
        let health_url = format!("{}/health", self.base_url);
        let latency_url = format!("{}/stats/latency", self.base_url);

        let (summary_res, listings_res, alerts_res, health_res, latency_res) = tokio::join!(
            client.get(&summary_url).send(),
            client.get(&listings_url).send(),
            client.get(&alerts_url).send(),
            client.get(&health_url).send(),
            client.get(&latency_url).send(),
        );

        let (summary_resp, listings_resp) = match (summary_res, listings_res) {
            (Ok(s), Ok(l)) => (s, l),
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };

        let (summary, listings) = tokio::join!(
            summary_resp.json::<SummaryResponse>(),
            listings_resp.json::<Vec<ListingResponse>>(),
        );

        match (summary, listings) {
            (Ok(s), Ok(l)) => {
                self.summary = s;
                self.listings = l;
                self.status = ConnectionStatus::Connected;

                if let Ok(a) = alerts_res {
                    if let Ok(alerts) = a.json::<Vec<AlertResponse>>().await {
                        self.alerts = alerts;
                    }
                }
                if let Ok(h) = health_res {
                    if let Ok(health) = h.json::<HealthResponse>().await {
                        self.health = health;
                    }
                }
                if let Ok(l) = latency_res {
                    if let Ok(latency) = l.json::<LatencyResponse>().await {
                        self.latency = latency;
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Whole euros with thin thousands grouping: 1234567 → "€1 234 567".
pub fn format_price(price: Option<f64>) -> String {
    let Some(p) = price else {
        return "—".to_string();
    };
    let digits = format!("{:.0}", p.max(0.0));
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    format!("€{grouped}")
}

pub fn format_price_m2(v: Option<f64>) -> String {
    v.map_or("—".to_string(), |p| format!("{p:.0}/m²"))
}

pub fn format_latency_us(us: Option<u64>) -> String {
    match us {
        Some(v) if v >= 1_000 => format!("{:.1}ms", v as f64 / 1_000.0),
        Some(v) => format!("{v}µs"),
        None => "—".to_string(),
    }
}

/// Convert nanosecond epoch timestamp to HH:MM:SS string.
pub fn format_time_ns(ns: i64) -> String {
    let secs = (ns.max(0) / 1_000_000_000) as u64;
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Character-safe: listing titles are full of accents.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_are_grouped() {
        assert_eq!(format_price(Some(1_234_567.0)), "€1 234 567");
        assert_eq!(format_price(Some(950.0)), "€950");
        assert_eq!(format_price(None), "—");
    }

    #[test]
    fn truncate_respects_multibyte_chars() {
        assert_eq!(truncate("Prédio em Alcântara", 8), "Prédio …");
        assert_eq!(truncate("T2", 8), "T2");
    }

    #[test]
    fn latency_units() {
        assert_eq!(format_latency_us(Some(850)), "850µs");
        assert_eq!(format_latency_us(Some(2_500)), "2.5ms");
    }
}
