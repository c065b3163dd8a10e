//! Per-device escape-time calculator.
//!
//! A [`DeviceCalculator`] owns one device's compiled program variants and a
//! device-side output buffer sized once for the largest segment it will
//! ever see. It runs at most one compute-then-copy operation at a time.

use crate::device::{
    BufferHandle, ComputeDevice, Event, KernelHandle, Precision, ProgramDescriptor, StagingBuffer,
};
use crate::error::{Error, Result};
use crate::fractal::{KernelVariant, LaunchParams};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Handles of one dispatched compute-then-copy operation.
#[derive(Debug, Clone)]
pub struct PendingCalculation {
    /// Kernel completion, for compute-only timing.
    pub compute: Event,
    /// Copy-back completion; the result is readable once this is done.
    pub copy: Event,
}

impl PendingCalculation {
    /// Non-blocking completion check on the copy.
    pub fn is_complete(&self) -> bool {
        self.copy.is_complete()
    }

    /// Wait for the copy, then confirm the kernel succeeded.
    pub fn wait(&self) -> Result<()> {
        self.copy.wait()?;
        self.compute.wait()
    }

    /// Compute plus copy time, once both are complete.
    pub fn elapsed(&self) -> Duration {
        self.compute.elapsed().unwrap_or_default() + self.copy.elapsed().unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct DeviceCalculator {
    device: Arc<dyn ComputeDevice>,
    precision: Precision,
    kernels: HashMap<KernelVariant, KernelHandle>,
    output: BufferHandle,
    max_width: usize,
    max_height: usize,
    in_flight: Option<Event>,
}

impl DeviceCalculator {
    /// Build every program variant and preallocate the output buffer.
    ///
    /// Fails with [`Error::Build`] if any variant does not compile.
    pub fn new(
        device: Arc<dyn ComputeDevice>,
        max_width: usize,
        max_height: usize,
        precision: Precision,
    ) -> Result<Self> {
        if max_width == 0 || max_height == 0 {
            return Err(Error::invalid_argument("maximum segment must be non-empty"));
        }

        let mut kernels = HashMap::with_capacity(KernelVariant::ALL.len());
        for variant in KernelVariant::ALL {
            let program = ProgramDescriptor::escape_time(variant, precision);
            kernels.insert(variant, device.build_program(&program)?);
        }

        let output = device.create_buffer(max_width * max_height)?;

        Ok(Self {
            device,
            precision,
            kernels,
            output,
            max_width,
            max_height,
            in_flight: None,
        })
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn max_segment(&self) -> (usize, usize) {
        (self.max_width, self.max_height)
    }

    /// Whether an operation is still outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .as_ref()
            .map(|event| !event.is_complete())
            .unwrap_or(false)
    }

    /// Fail with [`Error::Resolution`] unless neighbouring pixels of `[min,
    /// max)` sampled at `width x height` stay distinct in this calculator's
    /// precision anywhere inside the rectangle.
    ///
    /// Stricter than the per-call check in [`calculate`](Self::calculate):
    /// passing it for a whole area means no segment of that area can fail
    /// on resolution.
    pub fn check_resolution(
        &self,
        min: (f64, f64),
        max: (f64, f64),
        width: usize,
        height: usize,
    ) -> Result<()> {
        let magnitude = [min.0, min.1, max.0, max.1]
            .iter()
            .fold(0.0f64, |m, v| m.max(v.abs()));
        let spacing = self.precision.spacing(magnitude);
        let step = (
            (max.0 - min.0) / width.max(1) as f64,
            (max.1 - min.1) / height.max(1) as f64,
        );

        if step.0 < spacing || step.1 < spacing {
            return Err(Error::Resolution {
                device: self.device.info().name.clone(),
                min,
                max,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Dispatch the escape-time kernel over the complex rectangle
    /// `[min, max)` sampled at `width x height` pixels, then copy the result
    /// into `output`.
    ///
    /// Returns as soon as both commands are queued. Validation happens
    /// before anything reaches the device, so a failed call leaves the
    /// staging buffer untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &mut self,
        min: (f64, f64),
        max: (f64, f64),
        width: usize,
        height: usize,
        exponent: f64,
        max_iterations: u32,
        output: &StagingBuffer,
    ) -> Result<PendingCalculation> {
        let name = &self.device.info().name;

        if width == 0 || height == 0 {
            return Err(Error::invalid_argument(format!(
                "cannot calculate an empty {}x{} segment",
                width, height
            )));
        }

        if width > self.max_width
            || height > self.max_height
            || width * height > output.capacity()
        {
            return Err(Error::Capacity {
                device: name.clone(),
                min,
                max,
                width,
                height,
                max_width: self.max_width,
                max_height: self.max_height,
            });
        }

        if self.is_busy() {
            return Err(Error::sequencing(name.clone(), min, max));
        }

        let step = (
            pixel_step(self.precision, min.0, max.0, width),
            pixel_step(self.precision, min.1, max.1, height),
        );
        if !(step.0.abs() > 0.0 && step.1.abs() > 0.0) {
            return Err(Error::Resolution {
                device: name.clone(),
                min,
                max,
                width,
                height,
            });
        }

        let variant = KernelVariant::for_exponent(exponent);
        let kernel = self.kernels[&variant];
        let launch = LaunchParams {
            origin: (self.precision.round(min.0), self.precision.round(min.1)),
            step,
            width,
            height,
            exponent,
            max_iterations,
        };

        let compute = self.device.enqueue_kernel(kernel, &launch, self.output)?;
        self.in_flight = Some(compute.clone());

        let copy = self
            .device
            .enqueue_read(self.output, launch.pixels(), output)?;
        self.in_flight = Some(copy.clone());

        Ok(PendingCalculation { compute, copy })
    }
}

/// Per-pixel step in the device's working precision.
fn pixel_step(precision: Precision, min: f64, max: f64, extent: usize) -> f64 {
    match precision {
        Precision::Single => ((max as f32 - min as f32) / extent as f32) as f64,
        Precision::Double => (max - min) / extent as f64,
    }
}
