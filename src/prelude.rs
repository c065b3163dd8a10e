pub use crate::area::{Area, Canvas, Segment};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::device::{ComputeDevice, CpuDevice, DeviceId, DeviceKind, Precision};
pub use crate::error::{Error, Result};
pub use crate::fractal::{FractalParams, Viewport};
pub use crate::scheduler::{ParallelScheduler, SegmentResult};
pub use crate::telemetry::{DeviceStats, RunReport};

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};

#[cfg(feature = "gpu")]
pub use crate::device::GpuDevice;
