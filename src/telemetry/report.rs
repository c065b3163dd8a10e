//! Summaries returned to callers after a run.

use super::MetricsSnapshot;
use crate::area::Area;
use crate::device::{DeviceId, DeviceInfo, DeviceKind};
use crate::scheduler::Throughput;
use std::time::Duration;

/// Work one device finished, either in one run or over its lifetime.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceStats {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub batches: u64,
    pub pixels: u64,
    /// Summed compute and copy time.
    pub busy: Duration,
}

impl DeviceStats {
    pub(crate) fn new(id: DeviceId, info: &DeviceInfo, throughput: &Throughput) -> Self {
        Self {
            id,
            name: info.name.clone(),
            kind: info.kind,
            batches: throughput.batches,
            pixels: throughput.pixels,
            busy: throughput.busy,
        }
    }

    /// Pixels per second of busy time.
    pub fn throughput(&self) -> Option<f64> {
        Throughput {
            batches: self.batches,
            pixels: self.pixels,
            busy: self.busy,
        }
        .pixels_per_second()
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunReport {
    pub area: Area,
    pub wall_time: Duration,
    pub pixels: u64,
    pub batches: u64,
    pub devices: Vec<DeviceStats>,
    /// Present when telemetry is compiled in and enabled.
    pub metrics: Option<MetricsSnapshot>,
}

impl RunReport {
    pub fn pixels_per_second(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.pixels as f64 / secs
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceStats> {
        self.devices.iter().find(|stats| stats.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeviceInfo {
        DeviceInfo {
            name: "cpu".to_string(),
            kind: DeviceKind::Cpu,
            capabilities: vec![],
            compute_units: 1,
        }
    }

    #[test]
    fn test_device_stats_throughput() {
        let mut throughput = Throughput::default();
        throughput.record(500, Duration::from_millis(250));

        let stats = DeviceStats::new(DeviceId(3), &info(), &throughput);
        assert_eq!(stats.id, DeviceId(3));
        assert_eq!(stats.throughput(), Some(2000.0));

        let idle = DeviceStats::new(DeviceId(0), &info(), &Throughput::default());
        assert_eq!(idle.throughput(), None);
    }

    #[test]
    fn test_report_lookup() {
        let report = RunReport {
            area: Area::new(10, 10),
            wall_time: Duration::from_secs(2),
            pixels: 100,
            batches: 1,
            devices: vec![DeviceStats::new(DeviceId(1), &info(), &Throughput::default())],
            metrics: None,
        };

        assert_eq!(report.pixels_per_second(), 50.0);
        assert!(report.device(DeviceId(1)).is_some());
        assert!(report.device(DeviceId(0)).is_none());
    }
}
