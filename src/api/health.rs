//! Shared health state for the /health endpoint.
//! Updated by ListingWriter, ScoringEngine and StatusSweeper.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// Shared health metrics. Updated by scanner components, read by API.
#[derive(Default)]
pub struct HealthState {
    /// True once the scoring engine has entered its main loop.
    pub engine_running: AtomicBool,
    /// Nanosecond timestamp of the last finished full scoring pass (0 = none).
    pub last_pass_at_ns: AtomicU64,
    /// Listings scored since startup.
    pub listings_scored: AtomicU64,
    /// Approximate count of listings queued for the writer.
    pub ingest_queue_pending: AtomicU64,
    /// Nanosecond timestamp of the last successful upsert (0 = none).
    pub last_ingest_at_ns: AtomicU64,
    /// Listings marked inactive by the sweeper since startup.
    pub listings_swept: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub engine_running: bool,
    pub last_pass_at_ns: u64,
    pub listings_scored: u64,
    pub ingest_queue_pending: u64,
    pub last_ingest_at_ns: u64,
    pub listings_swept: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_engine_running(&self, v: bool) {
        self.engine_running.store(v, Ordering::Relaxed);
    }

    pub fn set_last_pass_at_ns(&self, ns: u64) {
        self.last_pass_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn inc_listings_scored(&self) {
        self.listings_scored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ingest_queue_pending(&self) {
        self.ingest_queue_pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec_ingest_queue_pending(&self) {
        let _ = self.ingest_queue_pending.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        });
    }

    pub fn set_last_ingest_at_ns(&self, ns: u64) {
        self.last_ingest_at_ns.store(ns, Ordering::Relaxed);
    }

    pub fn add_listings_swept(&self, n: u64) {
        self.listings_swept.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            engine_running: self.engine_running.load(Ordering::Relaxed),
            last_pass_at_ns: self.last_pass_at_ns.load(Ordering::Relaxed),
            listings_scored: self.listings_scored.load(Ordering::Relaxed),
            ingest_queue_pending: self.ingest_queue_pending.load(Ordering::Relaxed),
            last_ingest_at_ns: self.last_ingest_at_ns.load(Ordering::Relaxed),
            listings_swept: self.listings_swept.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_counter_never_underflows() {
        let health = HealthState::new();
        health.dec_ingest_queue_pending();
        assert_eq!(health.snapshot().ingest_queue_pending, 0);
        health.inc_ingest_queue_pending();
        health.inc_ingest_queue_pending();
        health.dec_ingest_queue_pending();
        assert_eq!(health.snapshot().ingest_queue_pending, 1);
    }
}
