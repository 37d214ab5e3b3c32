use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::config::{curation, paging, BENCHMARK_SNAPSHOTS_KEPT};
use crate::db::models::{AlertRow, BenchmarkRow, ListingRow, PriceHistoryRow};
use crate::error::{AppError, Result};
use crate::types::{
    now_ns, Alert, AlertType, Listing, ListingStatus, MarketBenchmark, OpportunityCategory,
    PriceHistoryEntry,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    /// `change_percent` is set when a price change was recorded.
    Updated { change_percent: Option<f64> },
}

/// Filters for [`ListingStore::get_listings`]. Deserializes straight from a
/// query string; absent fields mean "no constraint".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingFilter {
    pub min_score: Option<i64>,
    pub category: Option<OpportunityCategory>,
    /// Substring match.
    pub parish: Option<String>,
    pub typology: Option<String>,
    pub min_days: Option<i64>,
    pub max_days: Option<i64>,
    pub status: ListingStatus,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self {
            min_score: None,
            category: None,
            parish: None,
            typology: None,
            min_days: None,
            max_days: None,
            status: ListingStatus::Active,
            limit: paging::LISTINGS_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub active_listings: i64,
    /// Category code → count; unscored listings are counted under "N/A".
    pub by_category: BTreeMap<String, i64>,
    pub by_portal: BTreeMap<String, i64>,
    pub unread_alerts: i64,
}

/// SQLite-backed listing store. Cheap to clone; clones share the pool and the
/// per-listing lock table.
#[derive(Clone)]
pub struct ListingStore {
    pool: SqlitePool,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    benchmark_retention: i64,
}

impl ListingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(DashMap::new()),
            benchmark_retention: BENCHMARK_SNAPSHOTS_KEPT,
        }
    }

    /// Snapshots kept per zone and typology (at least one).
    pub fn with_benchmark_retention(mut self, keep: i64) -> Self {
        self.benchmark_retention = keep.max(1);
        self
    }

    /// Write transaction that takes SQLite's write lock up front. A deferred
    /// transaction that reads first cannot upgrade once another connection
    /// has committed (SQLITE_BUSY_SNAPSHOT), and the busy timeout does not
    /// retry that case.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Serializes writers of one listing id. The map guard is released before
    /// awaiting the listing's mutex.
    async fn lock_listing(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id.to_string()).or_default().value().clone();
        lock.lock_owned().await
    }

    // -----------------------------------------------------------------------
    // Listings
    // -----------------------------------------------------------------------

    /// Insert or update a listing, appending price history when the price moves.
    /// Score and category are never touched here.
    pub async fn upsert(&self, listing: &Listing) -> Result<UpsertOutcome> {
        if listing.id.trim().is_empty() || listing.url.trim().is_empty() {
            return Err(AppError::InvalidListing("listing needs an id and a url".to_string()));
        }

        let _guard = self.lock_listing(&listing.id).await;
        let mut tx = self.begin_write().await?;
        let now = now_ns();

        let existing: Option<(Option<f64>,)> =
            sqlx::query_as("SELECT price FROM listings WHERE id = ?")
                .bind(&listing.id)
                .fetch_optional(&mut *tx)
                .await?;

        let last_recorded: Option<i64> =
            sqlx::query_scalar("SELECT MAX(recorded_at) FROM price_history WHERE listing_id = ?")
                .bind(&listing.id)
                .fetch_one(&mut *tx)
                .await?;

        let features = serde_json::to_string(&listing.features)?;
        let photos = serde_json::to_string(&listing.photos)?;
        let contact = serde_json::to_string(&listing.contact)?;
        let driver_distances = serde_json::to_string(&listing.driver_distances)?;
        let zone_drivers = serde_json::to_string(&listing.zone_drivers)?;
        let intervention_drivers = serde_json::to_string(&listing.intervention_drivers)?;
        let risks = serde_json::to_string(&listing.risks)?;

        sqlx::query(
            r#"
            INSERT INTO listings (
                id, portal, url, title, price, area_m2, typology, location,
                parish, municipality, district, condition, year_built, description,
                features, photos, contact, latitude, longitude,
                driver_distances, zone_drivers, intervention_drivers, risks,
                days_on_market, price_per_m2, status,
                created_at, updated_at, last_seen
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                portal = excluded.portal,
                url = excluded.url,
                title = excluded.title,
                price = excluded.price,
                area_m2 = excluded.area_m2,
                typology = excluded.typology,
                location = excluded.location,
                parish = excluded.parish,
                municipality = excluded.municipality,
                district = excluded.district,
                condition = excluded.condition,
                year_built = excluded.year_built,
                description = excluded.description,
                features = excluded.features,
                photos = excluded.photos,
                contact = excluded.contact,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                driver_distances = excluded.driver_distances,
                zone_drivers = excluded.zone_drivers,
                intervention_drivers = excluded.intervention_drivers,
                risks = excluded.risks,
                days_on_market = excluded.days_on_market,
                price_per_m2 = excluded.price_per_m2,
                status = excluded.status,
                updated_at = excluded.updated_at,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.portal)
        .bind(&listing.url)
        .bind(&listing.title)
        .bind(listing.price)
        .bind(listing.area_m2)
        .bind(&listing.typology)
        .bind(&listing.location)
        .bind(&listing.parish)
        .bind(&listing.municipality)
        .bind(&listing.district)
        .bind(&listing.condition)
        .bind(listing.year_built)
        .bind(&listing.description)
        .bind(features)
        .bind(photos)
        .bind(contact)
        .bind(listing.latitude)
        .bind(listing.longitude)
        .bind(driver_distances)
        .bind(zone_drivers)
        .bind(intervention_drivers)
        .bind(risks)
        .bind(listing.days_on_market)
        .bind(listing.price_per_m2())
        .bind(listing.status.to_string())
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // recorded_at never goes backwards for a listing, even if the clock does.
        let recorded_at = last_recorded.map_or(now, |last| now.max(last));

        let outcome = match (existing, listing.price) {
            (None, price) => {
                if let Some(price) = price {
                    insert_history(&mut tx, &listing.id, price, 0.0, recorded_at).await?;
                }
                UpsertOutcome::Inserted
            }
            (Some(_), Some(new_price)) if last_recorded.is_none() => {
                insert_history(&mut tx, &listing.id, new_price, 0.0, recorded_at).await?;
                UpsertOutcome::Updated { change_percent: None }
            }
            (Some((Some(old_price),)), Some(new_price))
                if old_price != new_price && old_price != 0.0 =>
            {
                let change = (new_price - old_price) / old_price * 100.0;
                insert_history(&mut tx, &listing.id, new_price, change, recorded_at).await?;
                UpsertOutcome::Updated { change_percent: Some(change) }
            }
            (Some(_), _) => UpsertOutcome::Updated { change_percent: None },
        };

        tx.commit().await?;
        debug!(listing_id = %listing.id, ?outcome, "upserted listing");
        Ok(outcome)
    }

    pub async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        let row: Option<ListingRow> = sqlx::query_as("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Listing::from))
    }

    /// Filtered listings, best score first, newest first on ties.
    pub async fn get_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM listings WHERE status = ");
        qb.push_bind(filter.status.to_string());

        if let Some(min_score) = filter.min_score {
            qb.push(" AND opportunity_score >= ").push_bind(min_score);
        }
        if let Some(category) = filter.category {
            qb.push(" AND opportunity_category = ").push_bind(category.code());
        }
        if let Some(parish) = filter.parish.as_deref().filter(|p| !p.is_empty()) {
            qb.push(" AND parish LIKE ")
                .push_bind(format!("%{}%", escape_like(parish)))
                .push(" ESCAPE '\\'");
        }
        if let Some(typology) = filter.typology.as_deref().filter(|t| !t.is_empty()) {
            qb.push(" AND typology = ").push_bind(typology.to_string());
        }
        if let Some(min_days) = filter.min_days {
            qb.push(" AND days_on_market >= ").push_bind(min_days);
        }
        if let Some(max_days) = filter.max_days {
            qb.push(" AND days_on_market <= ").push_bind(max_days);
        }

        qb.push(" ORDER BY opportunity_score DESC, created_at DESC LIMIT ")
            .push_bind(filter.limit.max(0))
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));

        let rows: Vec<ListingRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    /// Every active listing, the candidate pool for comparables.
    pub async fn active_listings(&self) -> Result<Vec<Listing>> {
        let rows: Vec<ListingRow> =
            sqlx::query_as("SELECT * FROM listings WHERE status = 'active' ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    /// Shortlist of the strongest active opportunities: score at or above the
    /// curation floor, best score first, freshest first on ties.
    pub async fn curated(&self) -> Result<Vec<Listing>> {
        let rows: Vec<ListingRow> = sqlx::query_as(
            r#"
            SELECT * FROM listings
            WHERE status = 'active' AND opportunity_score >= ?
            ORDER BY opportunity_score DESC, days_on_market ASC
            LIMIT ?
            "#,
        )
        .bind(curation::MIN_SCORE)
        .bind(curation::MAX_LISTINGS)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    pub async fn record_score(
        &self,
        id: &str,
        score: i64,
        category: Option<OpportunityCategory>,
        scored_at: i64,
    ) -> Result<()> {
        let _guard = self.lock_listing(id).await;
        let result = sqlx::query(
            "UPDATE listings SET opportunity_score = ?, opportunity_category = ?, scored_at = ? WHERE id = ?",
        )
        .bind(score.clamp(0, 100))
        .bind(category.map(OpportunityCategory::code))
        .bind(scored_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("listing {id}")));
        }
        Ok(())
    }

    /// Returns false when no listing has this id.
    pub async fn set_status(&self, id: &str, status: ListingStatus) -> Result<bool> {
        let _guard = self.lock_listing(id).await;
        let result = sqlx::query("UPDATE listings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(now_ns())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Active listings not seen since `seen_before_ns` become inactive.
    pub async fn mark_stale_inactive(&self, seen_before_ns: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE listings SET status = 'inactive', updated_at = ? WHERE status = 'active' AND last_seen < ?",
        )
        .bind(now_ns())
        .bind(seen_before_ns)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Price history
    // -----------------------------------------------------------------------

    /// Oldest first.
    pub async fn get_price_history(&self, listing_id: &str) -> Result<Vec<PriceHistoryEntry>> {
        let rows: Vec<PriceHistoryRow> = sqlx::query_as(
            "SELECT * FROM price_history WHERE listing_id = ? ORDER BY recorded_at ASC, id ASC",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PriceHistoryEntry::from).collect())
    }

    // -----------------------------------------------------------------------
    // Benchmarks
    // -----------------------------------------------------------------------

    /// Persist a benchmark snapshot stamped now and prune the zone's oldest
    /// snapshots beyond the retention. Returns the stamp.
    pub async fn save_benchmark(&self, benchmark: &MarketBenchmark) -> Result<i64> {
        let mut tx = self.begin_write().await?;
        let recorded_at = now_ns();
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO market_benchmarks (
                parish, municipality, typology,
                avg_price_m2, median_price_m2, min_price_m2, max_price_m2, stdev_price_m2,
                sample_size, trend_6m, trend_12m, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&benchmark.parish)
        .bind(&benchmark.municipality)
        .bind(&benchmark.typology)
        .bind(benchmark.avg_price_m2)
        .bind(benchmark.median_price_m2)
        .bind(benchmark.min_price_m2)
        .bind(benchmark.max_price_m2)
        .bind(benchmark.stdev_price_m2)
        .bind(benchmark.sample_size)
        .bind(benchmark.trend_6m)
        .bind(benchmark.trend_12m)
        .bind(recorded_at)
        .execute(&mut *tx)
        .await?;

        let pruned = sqlx::query(
            r#"
            DELETE FROM market_benchmarks
            WHERE parish = ? AND municipality = ? AND typology = ?
              AND id NOT IN (
                SELECT id FROM market_benchmarks
                WHERE parish = ? AND municipality = ? AND typology = ?
                ORDER BY recorded_at DESC, id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(&benchmark.parish)
        .bind(&benchmark.municipality)
        .bind(&benchmark.typology)
        .bind(&benchmark.parish)
        .bind(&benchmark.municipality)
        .bind(&benchmark.typology)
        .bind(self.benchmark_retention)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        if pruned > 0 {
            debug!(parish = %benchmark.parish, typology = %benchmark.typology, pruned, "pruned benchmark snapshots");
        }
        Ok(recorded_at)
    }

    /// Stored snapshots for a parish and typology, newest first.
    pub async fn benchmark_history(
        &self,
        parish: &str,
        typology: &str,
        limit: i64,
    ) -> Result<Vec<MarketBenchmark>> {
        let rows: Vec<BenchmarkRow> = sqlx::query_as(
            r#"
            SELECT * FROM market_benchmarks
            WHERE parish = ? AND typology = ?
            ORDER BY recorded_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(parish)
        .bind(typology)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MarketBenchmark::from).collect())
    }

    /// Latest snapshot for a parish and typology.
    pub async fn get_benchmark(
        &self,
        parish: &str,
        typology: &str,
    ) -> Result<Option<MarketBenchmark>> {
        let row: Option<BenchmarkRow> = sqlx::query_as(
            r#"
            SELECT * FROM market_benchmarks
            WHERE parish = ? AND typology = ?
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(parish)
        .bind(typology)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MarketBenchmark::from))
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    pub async fn create_alert(
        &self,
        listing_id: &str,
        alert_type: AlertType,
        message: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO alerts (listing_id, alert_type, message, is_read, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(listing_id)
        .bind(alert_type.to_string())
        .bind(message)
        .bind(now_ns())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Newest first.
    pub async fn get_alerts(&self, unread_only: bool, limit: Option<i64>) -> Result<Vec<Alert>> {
        let limit = limit.unwrap_or(paging::ALERTS_LIMIT).max(0);
        let rows: Vec<AlertRow> = sqlx::query_as(
            r#"
            SELECT * FROM alerts
            WHERE (? = 0 OR is_read = 0)
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Alert::from).collect())
    }

    /// Returns false when no alert has this id.
    pub async fn mark_alert_read(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE alerts SET is_read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub async fn get_stats(&self) -> Result<StoreStats> {
        let by_category: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT opportunity_category, COUNT(*)
            FROM listings
            WHERE status = 'active'
            GROUP BY opportunity_category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let by_portal: Vec<(String, i64)> = sqlx::query_as(
            "SELECT portal, COUNT(*) FROM listings WHERE status = 'active' GROUP BY portal",
        )
        .fetch_all(&self.pool)
        .await?;

        let unread_alerts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE is_read = 0")
            .fetch_one(&self.pool)
            .await?;

        let by_category: BTreeMap<String, i64> = by_category
            .into_iter()
            .map(|(cat, n)| (cat.unwrap_or_else(|| "N/A".to_string()), n))
            .collect();

        Ok(StoreStats {
            active_listings: by_category.values().sum(),
            by_category,
            by_portal: by_portal.into_iter().collect(),
            unread_alerts,
        })
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Sqlite>,
    listing_id: &str,
    price: f64,
    change_percent: f64,
    recorded_at: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO price_history (listing_id, price, change_percent, recorded_at) VALUES (?, ?, ?, ?)",
    )
    .bind(listing_id)
    .bind(price)
    .bind(change_percent)
    .bind(recorded_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Makes `%`, `_` and the escape character itself literal in a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;

    fn flat(id: &str, price: f64) -> Listing {
        Listing::new(id, "idealista", format!("https://www.idealista.pt/imovel/{id}"))
            .with_price(price)
            .with_area(100.0)
            .with_typology("T2")
            .with_zone("Campo de Ourique", "Lisboa")
    }

    #[tokio::test]
    async fn first_upsert_inserts_with_baseline_history() {
        let store = test_store().await;
        let outcome = store.upsert(&flat("l1", 400_000.0)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let history = store.get_price_history("l1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_percent, 0.0);
        assert_eq!(history[0].price, 400_000.0);

        let stored = store.get_listing("l1").await.unwrap().unwrap();
        assert_eq!(stored.price_per_m2(), Some(4_000.0));
        assert_eq!(stored.status, ListingStatus::Active);
        assert!(stored.created_at > 0);
    }

    #[tokio::test]
    async fn price_change_appends_exactly_one_entry() {
        let store = test_store().await;
        store.upsert(&flat("l1", 400_000.0)).await.unwrap();
        let outcome = store.upsert(&flat("l1", 380_000.0)).await.unwrap();
        match outcome {
            UpsertOutcome::Updated { change_percent: Some(c) } => assert!((c + 5.0).abs() < 1e-9),
            other => panic!("unexpected outcome {other:?}"),
        }

        // unchanged price: no new entry
        let outcome = store.upsert(&flat("l1", 380_000.0)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated { change_percent: None });

        let history = store.get_price_history("l1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].recorded_at <= history[1].recorded_at);
        assert_eq!(history[1].price, 380_000.0);
    }

    #[tokio::test]
    async fn late_price_gets_a_baseline_entry() {
        let store = test_store().await;
        let mut listing = flat("l1", 0.0);
        listing.price = None;
        store.upsert(&listing).await.unwrap();
        assert!(store.get_price_history("l1").await.unwrap().is_empty());

        store.upsert(&flat("l1", 250_000.0)).await.unwrap();
        let history = store.get_price_history("l1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_percent, 0.0);
    }

    #[tokio::test]
    async fn upsert_keeps_engine_owned_fields() {
        let store = test_store().await;
        store.upsert(&flat("l1", 400_000.0)).await.unwrap();
        store.record_score("l1", 82, Some(OpportunityCategory::A), 42).await.unwrap();

        store.upsert(&flat("l1", 390_000.0)).await.unwrap();
        let stored = store.get_listing("l1").await.unwrap().unwrap();
        assert_eq!(stored.opportunity_score, 82);
        assert_eq!(stored.opportunity_category, Some(OpportunityCategory::A));
        assert_eq!(stored.scored_at, Some(42));
    }

    #[tokio::test]
    async fn upsert_rejects_missing_identity() {
        let store = test_store().await;
        let err = store.upsert(&Listing::new("", "p", "u")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidListing(_)));
    }

    #[tokio::test]
    async fn containers_round_trip_through_json_columns() {
        let store = test_store().await;
        let mut listing = flat("l1", 300_000.0);
        listing.features = vec!["varanda".to_string(), "elevador".to_string()];
        listing.contact.insert("phone".to_string(), "+351 900 000 000".to_string());
        listing.driver_distances.insert("metro".to_string(), 0.3);
        listing.zone_drivers.transport.push("Metro Rato".to_string());
        listing.risks.push("infiltracoes".to_string());
        store.upsert(&listing).await.unwrap();

        let stored = store.get_listing("l1").await.unwrap().unwrap();
        assert_eq!(stored.features, listing.features);
        assert_eq!(stored.contact, listing.contact);
        assert_eq!(stored.driver_distances, listing.driver_distances);
        assert_eq!(stored.zone_drivers, listing.zone_drivers);
        assert_eq!(stored.risks, listing.risks);
    }

    #[tokio::test]
    async fn filters_and_ordering() {
        let store = test_store().await;
        for (id, days, score, cat) in [
            ("a", 200, 80, Some(OpportunityCategory::A)),
            ("b", 10, 65, Some(OpportunityCategory::B)),
            ("c", 50, 30, None),
        ] {
            store.upsert(&flat(id, 300_000.0).with_days_on_market(days)).await.unwrap();
            store.record_score(id, score, cat, 1).await.unwrap();
        }
        store.upsert(&flat("x", 300_000.0).with_zone("Alvalade", "Lisboa")).await.unwrap();

        let all = store.get_listings(&ListingFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(&ids[..3], ["a", "b", "c"]);

        let filter = ListingFilter { min_score: Some(60), ..Default::default() };
        assert_eq!(store.get_listings(&filter).await.unwrap().len(), 2);

        let filter =
            ListingFilter { category: Some(OpportunityCategory::B), ..Default::default() };
        assert_eq!(store.get_listings(&filter).await.unwrap()[0].id, "b");

        let filter = ListingFilter { parish: Some("Ourique".to_string()), ..Default::default() };
        assert_eq!(store.get_listings(&filter).await.unwrap().len(), 3);

        let filter = ListingFilter { min_days: Some(40), max_days: Some(100), ..Default::default() };
        assert_eq!(store.get_listings(&filter).await.unwrap()[0].id, "c");

        let filter = ListingFilter { limit: 1, offset: 1, ..Default::default() };
        assert_eq!(store.get_listings(&filter).await.unwrap()[0].id, "b");

        store.set_status("a", ListingStatus::Sold).await.unwrap();
        let filter = ListingFilter { status: ListingStatus::Sold, ..Default::default() };
        assert_eq!(store.get_listings(&filter).await.unwrap()[0].id, "a");
    }

    #[tokio::test]
    async fn curated_shortlist_orders_by_score_then_freshness() {
        let store = test_store().await;
        for (id, days, score) in [("old", 300, 75), ("new", 5, 75), ("top", 100, 90), ("low", 1, 69)] {
            store.upsert(&flat(id, 300_000.0).with_days_on_market(days)).await.unwrap();
            store.record_score(id, score, Some(OpportunityCategory::D), 1).await.unwrap();
        }
        let curated = store.curated().await.unwrap();
        let ids: Vec<_> = curated.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["top", "new", "old"]);
    }

    #[tokio::test]
    async fn latest_benchmark_wins() {
        let store = test_store().await;
        let mut bench = MarketBenchmark {
            parish: "Campo de Ourique".to_string(),
            municipality: "Lisboa".to_string(),
            typology: "T2".to_string(),
            avg_price_m2: 4_000.0,
            median_price_m2: 4_000.0,
            min_price_m2: 3_500.0,
            max_price_m2: 4_500.0,
            stdev_price_m2: 250.0,
            sample_size: 4,
            trend_6m: 0.0,
            trend_12m: 0.0,
            recorded_at: None,
        };
        store.save_benchmark(&bench).await.unwrap();
        bench.avg_price_m2 = 4_200.0;
        store.save_benchmark(&bench).await.unwrap();

        let latest = store.get_benchmark("Campo de Ourique", "T2").await.unwrap().unwrap();
        assert_eq!(latest.avg_price_m2, 4_200.0);
        assert!(latest.recorded_at.is_some());
        assert!(store.get_benchmark("Campo de Ourique", "T3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn alerts_lifecycle() {
        let store = test_store().await;
        store.upsert(&flat("l1", 300_000.0)).await.unwrap();
        let first = store.create_alert("l1", AlertType::PriceDrop, "dropped 5%").await.unwrap();
        store.create_alert("l1", AlertType::HighScore, "score 80").await.unwrap();

        assert!(store.mark_alert_read(first).await.unwrap());
        assert!(!store.mark_alert_read(9_999).await.unwrap());

        let unread = store.get_alerts(true, None).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].alert_type, AlertType::HighScore);
        assert_eq!(store.get_alerts(false, Some(1)).await.unwrap().len(), 1);
        assert_eq!(store.get_alerts(false, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stats_count_active_listings() {
        let store = test_store().await;
        store.upsert(&flat("a", 300_000.0)).await.unwrap();
        store.upsert(&flat("b", 300_000.0)).await.unwrap();
        let mut other = flat("c", 300_000.0);
        other.portal = "imovirtual".to_string();
        store.upsert(&other).await.unwrap();
        store.record_score("a", 75, Some(OpportunityCategory::A), 1).await.unwrap();
        store.set_status("b", ListingStatus::Inactive).await.unwrap();
        store.create_alert("a", AlertType::Manual, "look").await.unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.active_listings, 2);
        assert_eq!(stats.by_category["A"], 1);
        assert_eq!(stats.by_category["N/A"], 1);
        assert_eq!(stats.by_portal["idealista"], 1);
        assert_eq!(stats.by_portal["imovirtual"], 1);
        assert_eq!(stats.unread_alerts, 1);
    }

    #[tokio::test]
    async fn stale_listings_are_marked_inactive() {
        let store = test_store().await;
        store.upsert(&flat("a", 300_000.0)).await.unwrap();
        assert_eq!(store.mark_stale_inactive(0).await.unwrap(), 0);
        assert_eq!(store.mark_stale_inactive(now_ns() + 1).await.unwrap(), 1);
        let a = store.get_listing("a").await.unwrap().unwrap();
        assert_eq!(a.status, ListingStatus::Inactive);
        assert!(store.active_listings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_score_on_unknown_listing_is_not_found() {
        let store = test_store().await;
        let err = store.record_score("ghost", 50, None, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn benchmark_snapshots_are_pruned_per_zone() {
        let store = test_store().await.with_benchmark_retention(3);
        let mut bench = MarketBenchmark {
            parish: "Campo de Ourique".to_string(),
            municipality: "Lisboa".to_string(),
            typology: "T2".to_string(),
            avg_price_m2: 4_000.0,
            median_price_m2: 4_000.0,
            min_price_m2: 4_000.0,
            max_price_m2: 4_000.0,
            stdev_price_m2: 0.0,
            sample_size: 1,
            trend_6m: 0.0,
            trend_12m: 0.0,
            recorded_at: None,
        };
        for i in 0..5 {
            bench.avg_price_m2 = 4_000.0 + f64::from(i);
            store.save_benchmark(&bench).await.unwrap();
        }
        bench.typology = "T3".to_string();
        store.save_benchmark(&bench).await.unwrap();

        let kept = store.benchmark_history("Campo de Ourique", "T2", 100).await.unwrap();
        let avgs: Vec<f64> = kept.iter().map(|b| b.avg_price_m2).collect();
        assert_eq!(avgs, [4_004.0, 4_003.0, 4_002.0]);
        assert_eq!(store.benchmark_history("Campo de Ourique", "T3", 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn parish_filter_matches_wildcards_literally() {
        let store = test_store().await;
        store.upsert(&flat("a", 300_000.0).with_zone("Santa_Maria", "Lisboa")).await.unwrap();
        store.upsert(&flat("b", 300_000.0).with_zone("SantaXMaria", "Lisboa")).await.unwrap();
        store.upsert(&flat("c", 300_000.0).with_zone("Lumiar", "Lisboa")).await.unwrap();

        let filter = ListingFilter { parish: Some("a_M".to_string()), ..Default::default() };
        let found = store.get_listings(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let filter = ListingFilter { parish: Some("%".to_string()), ..Default::default() };
        assert!(store.get_listings(&filter).await.unwrap().is_empty());
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Arroios"), "Arroios");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn upserts_commit_while_other_connections_write() {
        let (store, _dir) = crate::db::file_store().await;
        store.upsert(&flat("other", 500_000.0)).await.unwrap();

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let background = {
            let store = store.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let mut score = 0;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    score = (score + 1) % 100;
                    store.record_score("other", score, None, now_ns()).await.unwrap();
                    store.create_alert("other", AlertType::Manual, "tick").await.unwrap();
                }
            })
        };

        let rounds = 300;
        for i in 0..rounds {
            store.upsert(&flat("l1", 300_000.0 + f64::from(i))).await.unwrap();
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        background.await.unwrap();

        let history = store.get_price_history("l1").await.unwrap();
        assert_eq!(history.len(), rounds as usize);
        assert!(history.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_of_one_id_keep_history_consistent() {
        let (store, _dir) = crate::db::file_store().await;

        let writers: Vec<_> = (0..16)
            .map(|k| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.upsert(&flat("l1", 300_000.0 + f64::from(k) * 1_000.0)).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let history = store.get_price_history("l1").await.unwrap();
        // every price is distinct, so each upsert after the first adds one change
        assert_eq!(history.len(), 16);
        assert_eq!(history[0].change_percent, 0.0);
        for pair in history.windows(2) {
            assert!(pair[0].recorded_at <= pair[1].recorded_at);
            let expected = (pair[1].price - pair[0].price) / pair[0].price * 100.0;
            assert!((pair[1].change_percent - expected).abs() < 1e-9);
        }

        let stored = store.get_listing("l1").await.unwrap().unwrap();
        assert_eq!(stored.price, Some(history[15].price));
    }
}
