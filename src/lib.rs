//! fractile - heterogeneous tile scheduling for escape-time fractals
//!
//! Splits a 2-D area into row-major segments and keeps every CPU and GPU
//! device busy with batches sized from its own measured throughput.
//!
//! # Quick Start
//!
//! ```no_run
//! use fractile::prelude::*;
//!
//! let mut scheduler = ParallelScheduler::new(Config::default()).unwrap();
//!
//! let area = Area::new(1024, 768);
//! let mut canvas = Canvas::new(area);
//! let report = scheduler
//!     .calculate(area, &FractalParams::new(2.0, 256), |result| {
//!         canvas.blit(&result.segment, result.pixels);
//!     })
//!     .unwrap();
//!
//! println!("{} pixels in {:?}", report.pixels, report.wall_time);
//! ```
//!
//! # Features
//!
//! - **Adaptive batching**: batch sizes converge on a target duration per device
//! - **Single-flight devices**: one compute-then-copy operation per device at a time
//! - **CPU backend**: in-order queue thread fanning rows over compute units
//! - **GPU backend**: wgpu compute pipelines (optional, `gpu`)
//! - **Telemetry**: batch latency histograms in every run report (optional, `telemetry`)

#![warn(missing_debug_implementations)]

pub mod area;
pub mod calculator;
pub mod config;
pub mod device;
pub mod error;
pub mod fractal;
pub mod prelude;
pub mod scheduler;
pub mod telemetry;
pub mod util;

pub use area::{Area, AreaPartitioner, Canvas, Segment};
pub use calculator::{DeviceCalculator, PendingCalculation};
pub use config::{Config, ConfigBuilder};
pub use device::{ComputeDevice, DeviceId, DeviceInfo, DeviceKind, Precision};
pub use error::{Error, Result};
pub use fractal::{FractalParams, KernelVariant, Viewport};
pub use scheduler::{ParallelScheduler, SegmentResult};
pub use telemetry::{DeviceStats, RunReport};
