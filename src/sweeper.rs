use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::config::NANOS_PER_DAY;
use crate::db::ListingStore;
use crate::error::Result;
use crate::types::now_ns;

/// Marks listings inactive once no producer has reported them for a while.
/// Listings are never deleted.
pub struct StatusSweeper {
    store: ListingStore,
    interval_secs: u64,
    stale_after_days: u64,
    health: Arc<HealthState>,
}

impl StatusSweeper {
    pub fn new(
        store: ListingStore,
        interval_secs: u64,
        stale_after_days: u64,
        health: Arc<HealthState>,
    ) -> Self {
        Self { store, interval_secs, stale_after_days, health }
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.tick().await; // skip immediate first tick: startup ingest may still be in flight

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep().await {
                error!("Status sweep failed: {e}");
            }
        }
    }

    pub async fn sweep(&self) -> Result<u64> {
        let window = i64::try_from(self.stale_after_days)
            .unwrap_or(i64::MAX)
            .saturating_mul(NANOS_PER_DAY);
        let cutoff = now_ns().saturating_sub(window);
        let swept = self.store.mark_stale_inactive(cutoff).await?;
        self.health.add_listings_swept(swept);
        if swept > 0 {
            info!(swept, stale_after_days = self.stale_after_days, "Marked stale listings inactive");
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;
    use crate::types::{Listing, ListingStatus};

    #[tokio::test]
    async fn recent_listings_survive_and_zero_window_sweeps_all() {
        let store = test_store().await;
        store
            .upsert(&Listing::new("a", "idealista", "https://www.idealista.pt/imovel/a"))
            .await
            .unwrap();
        let health = Arc::new(HealthState::new());

        let lenient = StatusSweeper::new(store.clone(), 60, 14, Arc::clone(&health));
        assert_eq!(lenient.sweep().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let strict = StatusSweeper::new(store.clone(), 60, 0, Arc::clone(&health));
        assert_eq!(strict.sweep().await.unwrap(), 1);
        assert_eq!(health.snapshot().listings_swept, 1);

        let a = store.get_listing("a").await.unwrap().unwrap();
        assert_eq!(a.status, ListingStatus::Inactive);
    }
}
