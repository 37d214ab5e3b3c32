use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::types::{Listing, ListingStatus, ZoneDrivers};

/// One listing as producers emit it. Scraper output uses Portuguese keys, so
/// the common ones are accepted as aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawListing {
    pub id: Option<String>,
    #[serde(alias = "fonte")]
    pub portal: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "titulo")]
    pub title: Option<String>,
    #[serde(alias = "preco")]
    pub price: Option<f64>,
    #[serde(alias = "area")]
    pub area_m2: Option<f64>,
    #[serde(alias = "tipo", alias = "tipologia")]
    pub typology: Option<String>,
    #[serde(alias = "localizacao")]
    pub location: Option<String>,
    #[serde(alias = "freguesia")]
    pub parish: Option<String>,
    #[serde(alias = "concelho")]
    pub municipality: Option<String>,
    #[serde(alias = "distrito")]
    pub district: Option<String>,
    #[serde(alias = "estado")]
    pub condition: Option<String>,
    #[serde(alias = "ano_construcao")]
    pub year_built: Option<i32>,
    #[serde(alias = "descricao")]
    pub description: Option<String>,
    pub features: Vec<String>,
    pub photos: Vec<String>,
    pub contact: BTreeMap<String, String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub driver_distances: BTreeMap<String, f64>,
    pub zone_drivers: ZoneDrivers,
    pub intervention_drivers: Vec<String>,
    pub risks: Vec<String>,
    #[serde(alias = "dias_mercado")]
    pub days_on_market: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Default)]
pub struct IngestStats {
    pub total: usize,
    pub accepted: usize,
    pub rejected_malformed: usize,
    pub rejected_no_id: usize,
    pub rejected_no_url: usize,
    pub rejected_no_portal: usize,
    pub rejected_bad_numbers: usize,
}

impl IngestStats {
    pub fn rejected(&self) -> usize {
        self.rejected_malformed
            + self.rejected_no_id
            + self.rejected_no_url
            + self.rejected_no_portal
            + self.rejected_bad_numbers
    }
}

#[derive(Debug)]
enum Rejection {
    Malformed,
    NoId,
    NoUrl,
    NoPortal,
    BadNumbers,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl RawListing {
    fn into_listing(self) -> std::result::Result<Listing, Rejection> {
        let id = non_empty(self.id).ok_or(Rejection::NoId)?;
        let url = non_empty(self.url).ok_or(Rejection::NoUrl)?;
        let portal = non_empty(self.portal).ok_or(Rejection::NoPortal)?;

        let negative = |v: Option<f64>| v.is_some_and(|x| !x.is_finite() || x < 0.0);
        if negative(self.price)
            || negative(self.area_m2)
            || self.days_on_market.is_some_and(|d| d < 0)
        {
            return Err(Rejection::BadNumbers);
        }

        let mut listing = Listing::new(id, portal, url);
        // Scrapers write 0 when a price or area could not be read.
        listing.price = self.price.filter(|&p| p > 0.0);
        listing.area_m2 = self.area_m2.filter(|&a| a > 0.0);
        listing.title = self.title.unwrap_or_default();
        listing.typology = self.typology.unwrap_or_default();
        listing.location = self.location.unwrap_or_default();
        listing.parish = self.parish.unwrap_or_default();
        listing.municipality = self.municipality.unwrap_or_default();
        if let Some(district) = non_empty(self.district) {
            listing.district = district;
        }
        listing.condition = self.condition.unwrap_or_default();
        listing.year_built = self.year_built;
        listing.description = self.description.unwrap_or_default();
        listing.features = self.features;
        listing.photos = self.photos;
        listing.contact = self.contact;
        listing.latitude = self.latitude;
        listing.longitude = self.longitude;
        listing.driver_distances = self.driver_distances;
        listing.zone_drivers = self.zone_drivers;
        listing.intervention_drivers = self.intervention_drivers;
        listing.risks = self.risks;
        listing.days_on_market = self.days_on_market.unwrap_or(0);
        listing.status = self
            .status
            .as_deref()
            .and_then(|s| s.parse::<ListingStatus>().ok())
            .unwrap_or_default();
        Ok(listing)
    }
}

/// Validate a producer batch: either a JSON array of listings or an object
/// with a `listings` array. Bad items are counted and skipped.
pub fn parse_batch(body: &serde_json::Value) -> Result<(Vec<Listing>, IngestStats)> {
    let items = body
        .as_array()
        .or_else(|| body.get("listings").and_then(|l| l.as_array()))
        .ok_or_else(|| {
            AppError::InvalidListing("expected an array of listings".to_string())
        })?;

    let mut listings = Vec::with_capacity(items.len());
    let mut stats = IngestStats { total: items.len(), ..Default::default() };

    for item in items {
        let parsed = serde_json::from_value::<RawListing>(item.clone())
            .map_err(|_| Rejection::Malformed)
            .and_then(RawListing::into_listing);
        match parsed {
            Ok(listing) => listings.push(listing),
            Err(rejection) => {
                debug!(?rejection, "skipping listing");
                match rejection {
                    Rejection::Malformed => stats.rejected_malformed += 1,
                    Rejection::NoId => stats.rejected_no_id += 1,
                    Rejection::NoUrl => stats.rejected_no_url += 1,
                    Rejection::NoPortal => stats.rejected_no_portal += 1,
                    Rejection::BadNumbers => stats.rejected_bad_numbers += 1,
                }
            }
        }
    }

    stats.accepted = listings.len();
    Ok((listings, stats))
}

/// Load a batch from a local JSON file or an http(s) URL.
pub async fn load_batch(source: &str) -> Result<(Vec<Listing>, IngestStats)> {
    let body: serde_json::Value = if source.starts_with("http://") || source.starts_with("https://")
    {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        client.get(source).send().await?.error_for_status()?.json().await?
    } else {
        let text = tokio::fs::read_to_string(source).await?;
        serde_json::from_str(&text)?
    };

    let (listings, stats) = parse_batch(&body)?;
    info!(
        source,
        total = stats.total,
        accepted = stats.accepted,
        rejected = stats.rejected(),
        "Loaded ingest batch"
    );
    Ok((listings, stats))
}
