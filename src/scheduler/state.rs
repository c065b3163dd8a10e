//! Per-device bookkeeping for the scheduler.

use super::adaptive::Throughput;
use crate::area::{Area, Segment};
use crate::calculator::{DeviceCalculator, PendingCalculation};
use crate::device::{DeviceId, DeviceInfo, Precision, StagingBuffer};
use crate::error::{Error, Result};
use crate::fractal::FractalParams;
use std::mem;
use std::time::Duration;
use tracing::debug;

/// One finished segment, handed to the caller's callback.
///
/// `pixels` is a row-major view of exactly `segment.width * segment.height`
/// values and is only valid for the duration of the callback.
#[derive(Debug)]
pub struct SegmentResult<'a> {
    pub device: DeviceId,
    pub device_name: &'a str,
    pub segment: Segment,
    pub pixels: &'a [f32],
}

/// Dispatch state of a device.
#[derive(Debug)]
pub enum DeviceStatus {
    Idle,
    Busy {
        segment: Segment,
        pending: PendingCalculation,
    },
}

/// Bookkeeping of a finished batch.
#[derive(Debug, Clone, Copy)]
pub struct CompletedBatch {
    pub segment: Segment,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct DeviceState {
    id: DeviceId,
    calculator: DeviceCalculator,
    staging: StagingBuffer,
    status: DeviceStatus,
    /// Whole-lifetime history, drives batch sizing.
    pub(crate) history: Throughput,
    /// Work finished during the current run.
    pub(crate) run: Throughput,
    /// Received an empty segment during the current run.
    pub(crate) exhausted: bool,
}

impl DeviceState {
    /// Wrap `calculator` with a staging buffer sized for its largest segment.
    pub fn new(id: DeviceId, calculator: DeviceCalculator) -> Self {
        let (width, height) = calculator.max_segment();
        Self {
            id,
            calculator,
            staging: StagingBuffer::new(width * height),
            status: DeviceStatus::Idle,
            history: Throughput::default(),
            run: Throughput::default(),
            exhausted: false,
        }
    }

    /// Registry id of the device.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Static description of the device.
    pub fn info(&self) -> &DeviceInfo {
        self.calculator.device().info()
    }

    /// Precision the device's kernels were built in.
    pub fn precision(&self) -> Precision {
        self.calculator.precision()
    }

    /// Current dispatch state.
    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    /// Whether nothing is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self.status, DeviceStatus::Idle)
    }

    /// Throughput accumulated over the device's lifetime.
    pub fn history(&self) -> Throughput {
        self.history
    }

    /// Fail with [`Error::Resolution`] if this device cannot tell the
    /// pixels of `area` apart under `params`. Nothing is dispatched.
    pub fn check_resolution(&self, area: Area, params: &FractalParams) -> Result<()> {
        let viewport = params.viewport;
        self.calculator
            .check_resolution(viewport.min, viewport.max, area.width, area.height)
    }

    /// Idle -> Busy. Dispatching while busy is a sequencing error.
    pub fn dispatch(&mut self, area: Area, segment: Segment, params: &FractalParams) -> Result<()> {
        let (min, max) = params.viewport.segment_bounds(area, &segment);
        if !self.is_idle() {
            return Err(Error::sequencing(self.info().name.clone(), min, max));
        }

        let pending = self.calculator.calculate(
            min,
            max,
            segment.width,
            segment.height,
            params.exponent,
            params.max_iterations,
            &self.staging,
        )?;

        debug!(device = %self.id, segment = %segment, "dispatched");
        self.status = DeviceStatus::Busy { segment, pending };
        Ok(())
    }

    /// Non-blocking: whether the in-flight copy has finished.
    pub fn poll(&self) -> bool {
        match &self.status {
            DeviceStatus::Idle => false,
            DeviceStatus::Busy { pending, .. } => pending.is_complete(),
        }
    }

    /// Busy -> Idle. Waits for the operation, hands the result to
    /// `on_result` and records throughput.
    ///
    /// The device is idle afterwards even when the operation failed.
    pub fn complete<F>(&mut self, on_result: &mut F) -> Result<Option<CompletedBatch>>
    where
        F: FnMut(SegmentResult<'_>),
    {
        let (segment, pending) = match mem::replace(&mut self.status, DeviceStatus::Idle) {
            DeviceStatus::Idle => return Ok(None),
            DeviceStatus::Busy { segment, pending } => (segment, pending),
        };

        if let Err(e) = pending.wait() {
            let message = match e {
                Error::Hardware(message) => message,
                other => other.to_string(),
            };
            return Err(Error::Device {
                device: self.info().name.clone(),
                segment,
                message,
            });
        }

        {
            let view = self.staging.view(segment.pixels());
            on_result(SegmentResult {
                device: self.id,
                device_name: &self.calculator.device().info().name,
                segment,
                pixels: &view,
            });
        }

        let elapsed = pending.elapsed();
        self.history.record(segment.pixels(), elapsed);
        self.run.record(segment.pixels(), elapsed);
        debug!(device = %self.id, segment = %segment, elapsed_us = elapsed.as_micros() as u64, "completed");

        Ok(Some(CompletedBatch { segment, elapsed }))
    }
}
