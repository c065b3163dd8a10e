//! Compute device abstraction.
//!
//! A [`ComputeDevice`] is one compute unit with its own strictly in-order
//! command queue. Devices build kernels, own fixed-size buffers, and return
//! an [`Event`] for every queued command. Two backends ship with the crate:
//! [`CpuDevice`] and, behind the `gpu` feature, a wgpu-based `GpuDevice`.

pub mod cpu;
pub mod event;
pub mod registry;
pub mod staging;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use cpu::{CpuDevice, CpuDeviceBuilder};
pub use event::{Event, EventPump, EventStatus};
pub use registry::DeviceRegistry;
pub use staging::StagingBuffer;

#[cfg(feature = "gpu")]
pub use gpu::GpuDevice;

use crate::error::Result;
use crate::fractal::{KernelVariant, LaunchParams};
use std::fmt;
use std::sync::Arc;

/// Stable identifier of a device inside a [`DeviceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Floating-point precision kernels run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl Precision {
    /// Capability a device must report to build kernels in this precision.
    pub fn capability(&self) -> &'static str {
        match self {
            Precision::Single => "fp32",
            Precision::Double => "fp64",
        }
    }

    /// Round `value` to this precision.
    pub fn round(&self, value: f64) -> f64 {
        match self {
            Precision::Single => value as f32 as f64,
            Precision::Double => value,
        }
    }

    /// Gap between `magnitude` and the next representable value above it.
    pub fn spacing(&self, magnitude: f64) -> f64 {
        let magnitude = magnitude.abs();
        match self {
            Precision::Single => {
                let value = magnitude as f32;
                (f32::from_bits(value.to_bits() + 1) - value) as f64
            }
            Precision::Double => f64::from_bits(magnitude.to_bits() + 1) - magnitude,
        }
    }
}

/// Static description of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: DeviceKind,
    pub capabilities: Vec<String>,
    pub compute_units: usize,
}

impl DeviceInfo {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Double precision where available, single otherwise.
    pub fn preferred_precision(&self) -> Precision {
        if self.supports(Precision::Double.capability()) {
            Precision::Double
        } else {
            Precision::Single
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {} compute units)",
            self.name, self.kind, self.compute_units
        )
    }
}

/// Everything a device needs to build one kernel program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDescriptor {
    pub name: String,
    pub variant: KernelVariant,
    pub precision: Precision,
    pub source: &'static str,
    pub flags: Vec<String>,
    pub required_capabilities: Vec<String>,
}

impl ProgramDescriptor {
    pub fn escape_time(variant: KernelVariant, precision: Precision) -> Self {
        let real = match precision {
            Precision::Single => "f32",
            Precision::Double => "f64",
        };

        Self {
            name: variant.entry_point().to_string(),
            variant,
            precision,
            source: kernel_source(),
            flags: vec![format!("-DREAL={}", real)],
            required_capabilities: vec![precision.capability().to_string()],
        }
    }

    /// The first required capability `info` lacks.
    pub fn missing_capability(&self, info: &DeviceInfo) -> Option<&str> {
        self.required_capabilities
            .iter()
            .map(String::as_str)
            .find(|cap| !info.supports(cap))
    }
}

#[cfg(feature = "gpu")]
fn kernel_source() -> &'static str {
    crate::fractal::WGSL_SOURCE
}

#[cfg(not(feature = "gpu"))]
fn kernel_source() -> &'static str {
    ""
}

/// Opaque handle to a kernel built on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub usize);

/// Opaque handle to a device-side buffer of `f32` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub usize);

/// One compute unit with a private, strictly in-order command queue.
pub trait ComputeDevice: Send + Sync + fmt::Debug {
    fn info(&self) -> &DeviceInfo;

    /// Compile `program`. Fails with [`Error::Build`](crate::Error::Build)
    /// carrying the build log.
    fn build_program(&self, program: &ProgramDescriptor) -> Result<KernelHandle>;

    /// Allocate a device buffer of `len` values.
    fn create_buffer(&self, len: usize) -> Result<BufferHandle>;

    /// Queue a 2-D launch of `kernel` writing `launch.pixels()` values into
    /// `output`.
    fn enqueue_kernel(
        &self,
        kernel: KernelHandle,
        launch: &LaunchParams,
        output: BufferHandle,
    ) -> Result<Event>;

    /// Queue a copy of the first `len` values of `buffer` into `dest`.
    fn enqueue_read(&self, buffer: BufferHandle, len: usize, dest: &StagingBuffer)
        -> Result<Event>;

    /// Split into sub-devices with the given compute-unit counts, each with
    /// its own queue.
    fn split_by_compute_units(&self, counts: &[usize]) -> Result<Vec<Arc<dyn ComputeDevice>>> {
        let _ = counts;
        Err(crate::Error::unsupported(format!(
            "{} cannot be partitioned",
            self.info().name
        )))
    }
}
