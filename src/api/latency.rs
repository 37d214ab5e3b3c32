//! In-memory latency histogram for the scoring pipeline.
//! Records the time to evaluate and persist one listing.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

use crate::error::{AppError, Result};

/// Shared latency stats. Engine records, API reads.
/// Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<Histogram<u64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyPercentiles {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
}

impl LatencyStats {
    /// Tracks 1us to 100s, 3 significant figures.
    pub fn new() -> Result<Self> {
        let histogram = Histogram::new_with_bounds(1, 100_000_000, 3)
            .map_err(|e| AppError::Config(format!("latency histogram: {e}")))?;
        Ok(Self { inner: Mutex::new(histogram) })
    }

    pub fn record_us(&self, us: u64) {
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    pub fn percentiles(&self) -> LatencyPercentiles {
        let Ok(h) = self.inner.lock() else {
            return LatencyPercentiles { samples: 0, p50_us: None, p95_us: None, p99_us: None };
        };
        if h.len() == 0 {
            return LatencyPercentiles { samples: 0, p50_us: None, p95_us: None, p99_us: None };
        }
        LatencyPercentiles {
            samples: h.len(),
            p50_us: Some(h.value_at_quantile(0.5)),
            p95_us: Some(h.value_at_quantile(0.95)),
            p99_us: Some(h.value_at_quantile(0.99)),
        }
    }
}
