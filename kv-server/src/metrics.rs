//! # Server metrics
//!
//! Request counters and a latency histogram for `INFO`-style admin
//! inspection (C14). Backed by `hdrhistogram` rather than the teacher's
//! fixed-bucket array, since the histogram needs to report percentiles
//! (p50/p99) and hand-rolled linear buckets only give coarse ranges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;

/// Snapshot of all server metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub inflight: u64,
    pub latency: LatencySnapshot,
}

/// Snapshot of the latency histogram, in microseconds.
#[derive(Debug, Clone)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub max_us: u64,
}

/// Thread-safe metrics aggregator for the server.
pub struct Metrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    latency: Mutex<Histogram<u64>>,
}

impl Metrics {
    /// Tracks latencies from 1 microsecond to 10 seconds with 3 significant
    /// figures, matching the precision the pack's load-tester asks for.
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, 10_000_000, 3)
            .expect("valid histogram bounds");
        Metrics {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            latency: Mutex::new(histogram),
        }
    }

    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        let mut histogram = self.latency.lock().expect("metrics lock poisoned");
        let _ = histogram.record(micros.max(1));
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.latency.lock().expect("metrics lock poisoned");
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            latency: LatencySnapshot {
                samples: histogram.len(),
                mean_us: histogram.mean(),
                p50_us: histogram.value_at_quantile(0.50),
                p99_us: histogram.value_at_quantile(0.99),
                p999_us: histogram.value_at_quantile(0.999),
                max_us: histogram.max(),
            },
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_requests_and_latency() {
        let metrics = Metrics::new();
        metrics.record_request_start();
        metrics.record_request_end(Duration::from_micros(500));
        metrics.record_request_start();
        metrics.record_request_end(Duration::from_micros(1500));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.inflight, 0);
        assert_eq!(snapshot.latency.samples, 2);
        assert!(snapshot.latency.p99_us >= 500);
    }

    #[test]
    fn tracks_errors_separately_from_requests() {
        let metrics = Metrics::new();
        metrics.record_error();
        metrics.record_error();
        assert_eq!(metrics.snapshot().errors_total, 2);
    }
}
