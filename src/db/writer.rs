use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::db::store::{ListingStore, UpsertOutcome};
use crate::error::Result;
use crate::types::{now_ns, AlertType, Listing};

/// Receives listings from producers (startup loader, HTTP handler) and
/// persists them. The only task that upserts, so ingest never races itself.
pub struct ListingWriter {
    store: ListingStore,
    ingest_rx: mpsc::Receiver<Listing>,
    rescore_tx: mpsc::Sender<String>,
    health: Arc<HealthState>,
}

impl ListingWriter {
    pub fn new(
        store: ListingStore,
        ingest_rx: mpsc::Receiver<Listing>,
        rescore_tx: mpsc::Sender<String>,
        health: Arc<HealthState>,
    ) -> Self {
        Self { store, ingest_rx, rescore_tx, health }
    }

    pub async fn run(mut self) {
        info!("Listing writer started");
        while let Some(listing) = self.ingest_rx.recv().await {
            self.health.dec_ingest_queue_pending();
            if let Err(e) = self.write_listing(&listing).await {
                error!(listing_id = %listing.id, "DB write error: {e}");
            }
        }
        info!("Listing writer stopped: ingest channel closed");
    }

    async fn write_listing(&self, listing: &Listing) -> Result<UpsertOutcome> {
        let outcome = self.store.upsert(listing).await?;
        self.health.set_last_ingest_at_ns(now_ns().max(0) as u64);

        if let UpsertOutcome::Updated { change_percent: Some(change) } = outcome {
            if change < 0.0 {
                let message = format!(
                    "Price dropped {:.1}% to €{:.0}",
                    change.abs(),
                    listing.price.unwrap_or_default()
                );
                self.store.create_alert(&listing.id, AlertType::PriceDrop, &message).await?;
                info!(listing_id = %listing.id, change_percent = change, "price drop recorded");
            }
        }

        // A full pass picks the listing up anyway when the queue is full.
        if let Err(e) = self.rescore_tx.try_send(listing.id.clone()) {
            warn!(listing_id = %listing.id, "rescore queue unavailable: {e}");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_store;

    fn flat(price: f64) -> Listing {
        Listing::new("l1", "idealista", "https://www.idealista.pt/imovel/l1")
            .with_price(price)
            .with_area(80.0)
    }

    #[tokio::test]
    async fn drains_channel_and_requests_rescore() {
        let store = test_store().await;
        let (ingest_tx, ingest_rx) = mpsc::channel(8);
        let (rescore_tx, mut rescore_rx) = mpsc::channel(8);
        let health = Arc::new(HealthState::new());
        let writer = ListingWriter::new(store.clone(), ingest_rx, rescore_tx, Arc::clone(&health));

        ingest_tx.send(flat(300_000.0)).await.unwrap();
        ingest_tx.send(flat(270_000.0)).await.unwrap();
        drop(ingest_tx);
        writer.run().await;

        assert_eq!(rescore_rx.recv().await.as_deref(), Some("l1"));
        assert_eq!(rescore_rx.recv().await.as_deref(), Some("l1"));
        assert_eq!(store.get_price_history("l1").await.unwrap().len(), 2);
        assert!(health.snapshot().last_ingest_at_ns > 0);

        let alerts = store.get_alerts(true, None).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::PriceDrop);
        assert!(alerts[0].message.contains("10.0%"));
    }

    #[tokio::test]
    async fn price_rise_raises_no_alert() {
        let store = test_store().await;
        let (_ingest_tx, ingest_rx) = mpsc::channel(1);
        let (rescore_tx, _rescore_rx) = mpsc::channel(8);
        let writer =
            ListingWriter::new(store.clone(), ingest_rx, rescore_tx, Arc::new(HealthState::new()));

        writer.write_listing(&flat(300_000.0)).await.unwrap();
        let outcome = writer.write_listing(&flat(330_000.0)).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Updated { change_percent: Some(c) } if c > 0.0));
        assert!(store.get_alerts(false, None).await.unwrap().is_empty());
    }
}
