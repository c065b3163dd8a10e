//! Run telemetry.
//!
//! Batch latencies and counters are collected per run when the `telemetry`
//! feature is on. [`RunReport`] is always available.

#[cfg(feature = "telemetry")]
pub mod metrics;

pub mod report;

#[cfg(feature = "telemetry")]
pub use metrics::{Metrics, MetricsSnapshot};

pub use report::{DeviceStats, RunReport};

// Stub implementations when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self {
            Self
        }
        pub fn record_batch(&self, _: usize, _: Duration) {}
        pub fn record_failure(&self) {}
        pub fn snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot::default()
        }
        pub fn reset(&self) {}
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
}

#[cfg(not(feature = "telemetry"))]
pub use metrics::{Metrics, MetricsSnapshot};
