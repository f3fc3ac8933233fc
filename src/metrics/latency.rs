//! Round-trip latency of `GetMarketsState` calls, successful or not.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Percentile summary in microseconds. Percentiles are None until a sample exists.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
    pub max_us: Option<u64>,
}

pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Tracks 1us to 10 minutes, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, 600_000_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let empty = LatencySummary {
            samples: 0,
            p50_us: None,
            p95_us: None,
            p99_us: None,
            max_us: None,
        };
        let Ok(h) = self.inner.lock() else {
            return empty;
        };
        if h.len() == 0 {
            return empty;
        }
        LatencySummary {
            samples: h.len(),
            p50_us: Some(h.value_at_quantile(0.5)),
            p95_us: Some(h.value_at_quantile(0.95)),
            p99_us: Some(h.value_at_quantile(0.99)),
            max_us: Some(h.max()),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        assert_eq!(stats.summary().samples, 0);
        assert!(stats.summary().p99_us.is_none());
    }

    #[test]
    fn zero_duration_is_still_counted() {
        let stats = LatencyStats::new();
        stats.record(Duration::ZERO);
        stats.record(Duration::from_millis(5));
        let summary = stats.summary();
        assert_eq!(summary.samples, 2);
        assert!(summary.max_us.unwrap() >= 4_990);
    }
}
