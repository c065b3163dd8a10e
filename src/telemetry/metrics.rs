//! Batch metrics for one scheduling run.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Run metrics collector
#[derive(Debug)]
pub struct Metrics {
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    pixels_processed: AtomicU64,
    busy_time_ns: AtomicU64,

    // batch durations in nanoseconds
    batch_histogram: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        // 3 significant figures, up to one hour
        let histogram = Histogram::new_with_max(3_600_000_000_000, 3)
            .expect("constant histogram bounds are valid");

        Self {
            batches_completed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            pixels_processed: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
            batch_histogram: RwLock::new(histogram),
            start_time: Instant::now(),
        }
    }

    /// Record a finished batch.
    pub fn record_batch(&self, pixels: usize, elapsed: Duration) {
        let ns = elapsed.as_nanos().min(u64::MAX as u128) as u64;

        self.batches_completed.fetch_add(1, Ordering::Relaxed);
        self.pixels_processed.fetch_add(pixels as u64, Ordering::Relaxed);
        self.busy_time_ns.fetch_add(ns, Ordering::Relaxed);

        let _ = self.batch_histogram.write().saturating_record(ns.max(1));
    }

    pub fn record_failure(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.batch_histogram.read();
        let populated = histogram.len() > 0;

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            pixels_processed: self.pixels_processed.load(Ordering::Relaxed),
            busy_time_ns: self.busy_time_ns.load(Ordering::Relaxed),
            avg_batch_ns: if populated { histogram.mean() as u64 } else { 0 },
            p50_batch_ns: if populated { histogram.value_at_quantile(0.50) } else { 0 },
            p99_batch_ns: if populated { histogram.value_at_quantile(0.99) } else { 0 },
            max_batch_ns: if populated { histogram.max() } else { 0 },
        }
    }

    pub fn reset(&self) {
        self.batches_completed.store(0, Ordering::Relaxed);
        self.batches_failed.store(0, Ordering::Relaxed);
        self.pixels_processed.store(0, Ordering::Relaxed);
        self.busy_time_ns.store(0, Ordering::Relaxed);
        self.batch_histogram.write().reset();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub pixels_processed: u64,
    pub busy_time_ns: u64,
    pub avg_batch_ns: u64,
    pub p50_batch_ns: u64,
    pub p99_batch_ns: u64,
    pub max_batch_ns: u64,
}

impl MetricsSnapshot {
    /// Aggregate pixels per second of device busy time.
    pub fn pixels_per_busy_second(&self) -> f64 {
        if self.busy_time_ns == 0 {
            return 0.0;
        }
        self.pixels_processed as f64 / (self.busy_time_ns as f64 / 1e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = Metrics::new();

        metrics.record_batch(100, Duration::from_micros(10));
        metrics.record_batch(300, Duration::from_micros(30));
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_completed, 2);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.pixels_processed, 400);
        assert!(snapshot.avg_batch_ns > 0);
        assert!(snapshot.p99_batch_ns >= snapshot.p50_batch_ns);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = Metrics::new();

        metrics.record_batch(1, Duration::from_nanos(1000));
        assert_eq!(metrics.snapshot().batches_completed, 1);

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_completed, 0);
        assert_eq!(snapshot.p50_batch_ns, 0);
    }

    #[test]
    fn test_throughput() {
        let snapshot = MetricsSnapshot {
            pixels_processed: 1_000,
            busy_time_ns: 500_000_000,
            ..Default::default()
        };
        assert_eq!(snapshot.pixels_per_busy_second(), 2_000.0);
        assert_eq!(MetricsSnapshot::default().pixels_per_busy_second(), 0.0);
    }
}
