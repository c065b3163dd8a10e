//! Heterogeneous tile scheduling.
//!
//! [`ParallelScheduler`] owns one [`DeviceState`] per selected device and
//! drives them all from a single controller thread. Each pass over the
//! devices hands an adaptively sized segment to every idle device and
//! collects every finished one, so no device ever waits on another.
//! Parallelism comes from the devices' own queues, not from host threads.

pub mod adaptive;
pub mod state;

pub use adaptive::{BatchSizer, Throughput};
pub use state::{CompletedBatch, DeviceState, DeviceStatus, SegmentResult};

use crate::area::{Area, AreaPartitioner};
use crate::calculator::DeviceCalculator;
use crate::config::Config;
use crate::device::{ComputeDevice, DeviceRegistry};
use crate::error::{Error, Result};
use crate::fractal::FractalParams;
use crate::telemetry::{DeviceStats, Metrics, RunReport};
use crate::util::Backoff;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ParallelScheduler {
    config: Config,
    sizer: BatchSizer,
    states: Vec<DeviceState>,
}

impl ParallelScheduler {
    /// Discover the host's devices and prepare a calculator on each.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let registry = DeviceRegistry::discover(&config)?;
        Self::with_registry(config, registry)
    }

    /// Schedule over caller-supplied devices, applying the same selection
    /// as discovery.
    pub fn with_devices(config: Config, devices: Vec<Arc<dyn ComputeDevice>>) -> Result<Self> {
        let registry = DeviceRegistry::select(devices, config.reserve_host_core);
        Self::with_registry(config, registry)
    }

    /// Schedule over exactly the devices in `registry`.
    ///
    /// Devices whose programs fail to build are logged and left out. Fails
    /// with [`Error::NoDevices`] if none remain.
    pub fn with_registry(config: Config, registry: DeviceRegistry) -> Result<Self> {
        config.validate()?;
        let (max_width, max_height) = config.max_segment();

        let mut states = Vec::with_capacity(registry.len());
        for (id, device) in registry.iter() {
            let precision = config
                .precision
                .unwrap_or_else(|| device.info().preferred_precision());

            match DeviceCalculator::new(device.clone(), max_width, max_height, precision) {
                Ok(calculator) => {
                    info!(device = %device.info(), id = %id, ?precision, "device ready");
                    states.push(DeviceState::new(id, calculator));
                }
                Err(e) if e.is_recoverable() => {
                    warn!(device = %device.info(), error = %e, "dropping device");
                }
                Err(e) => return Err(e),
            }
        }

        if states.is_empty() {
            return Err(Error::NoDevices);
        }

        Ok(Self {
            sizer: BatchSizer::from(&config),
            config,
            states,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One state per usable device, in registry order.
    pub fn devices(&self) -> &[DeviceState] {
        &self.states
    }

    /// Throughput accumulated over every run so far.
    pub fn device_stats(&self) -> Vec<DeviceStats> {
        self.states
            .iter()
            .map(|state| DeviceStats::new(state.id(), state.info(), &state.history))
            .collect()
    }

    /// Forget throughput history; every device starts over at the initial
    /// fragment count.
    pub fn reset_statistics(&mut self) {
        for state in &mut self.states {
            state.history = Throughput::default();
        }
    }

    /// Compute `area` across every device, calling `on_result` once per
    /// finished segment in completion order.
    ///
    /// The segments reported by a successful run tile `area` exactly. A
    /// runtime failure on any device is fatal: the other in-flight batches
    /// are still waited out and delivered if they succeeded, then the first
    /// error is returned. Invalid parameters and a viewport too fine for
    /// any device's precision fail before anything is dispatched.
    pub fn calculate<F>(&mut self, area: Area, params: &FractalParams, mut on_result: F) -> Result<RunReport>
    where
        F: FnMut(SegmentResult<'_>),
    {
        params.validate()?;
        let mut partitioner =
            AreaPartitioner::new(area, self.config.fragment_width, self.config.fragment_height)?;

        // every device, before any of them gets work
        for state in &self.states {
            state.check_resolution(area, params)?;
        }

        for state in &mut self.states {
            debug_assert!(state.is_idle());
            state.exhausted = false;
            state.run = Throughput::default();
        }

        let metrics = Metrics::new();
        let started = Instant::now();
        let mut backoff = Backoff::new();
        let mut failure: Option<Error> = None;

        info!(
            width = area.width,
            height = area.height,
            exponent = params.exponent,
            max_iterations = params.max_iterations,
            devices = self.states.len(),
            "run started"
        );

        'assign: while self.states.iter().any(|state| !state.exhausted) {
            let mut progressed = false;

            for state in &mut self.states {
                if state.is_idle() {
                    if state.exhausted {
                        continue;
                    }

                    let count = self.sizer.next_fragment_count(&state.history);
                    let segment = partitioner.partition(count);
                    if segment.is_empty() {
                        debug!(device = %state.id(), "no more work");
                        state.exhausted = true;
                        continue;
                    }

                    if let Err(e) = state.dispatch(area, segment, params) {
                        failure = Some(e);
                        break 'assign;
                    }
                    progressed = true;
                } else if state.poll() {
                    match state.complete(&mut on_result) {
                        Ok(Some(batch)) => metrics.record_batch(batch.segment.pixels(), batch.elapsed),
                        Ok(None) => {}
                        Err(e) => {
                            metrics.record_failure();
                            failure = Some(e);
                            break 'assign;
                        }
                    }
                    progressed = true;
                }
            }

            if progressed {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }

        // Drain. Blocking is fine now: nothing is left to hand out.
        for state in &mut self.states {
            match state.complete(&mut on_result) {
                Ok(Some(batch)) => metrics.record_batch(batch.segment.pixels(), batch.elapsed),
                Ok(None) => {}
                Err(e) => {
                    metrics.record_failure();
                    if failure.is_some() {
                        error!(error = %e, "further failure while draining");
                    } else {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            error!(error = %e, "run aborted");
            return Err(e);
        }

        let report = self.report(area, started, &metrics);
        info!(
            pixels = report.pixels,
            batches = report.batches,
            wall_ms = report.wall_time.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }

    fn report(&self, area: Area, started: Instant, metrics: &Metrics) -> RunReport {
        let devices: Vec<DeviceStats> = self
            .states
            .iter()
            .map(|state| DeviceStats::new(state.id(), state.info(), &state.run))
            .collect();

        RunReport {
            area,
            wall_time: started.elapsed(),
            pixels: devices.iter().map(|d| d.pixels).sum(),
            batches: devices.iter().map(|d| d.batches).sum(),
            devices,
            metrics: self.telemetry_enabled().then(|| metrics.snapshot()),
        }
    }

    #[cfg(feature = "telemetry")]
    fn telemetry_enabled(&self) -> bool {
        self.config.enable_telemetry
    }

    #[cfg(not(feature = "telemetry"))]
    fn telemetry_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::Canvas;
    use crate::device::CpuDevice;

    fn config() -> Config {
        Config::builder()
            .fragment_size(4, 2)
            .max_fragment_count(8)
            .reserve_host_core(false)
            .build()
            .unwrap()
    }

    fn cpu(units: usize) -> Arc<dyn ComputeDevice> {
        Arc::new(CpuDevice::builder().compute_units(units).build().unwrap())
    }

    #[test]
    fn test_single_device_covers_area() {
        let mut scheduler = ParallelScheduler::with_devices(config(), vec![cpu(2)]).unwrap();
        let area = Area::new(18, 7);
        let mut canvas = Canvas::new(area);

        let report = scheduler
            .calculate(area, &FractalParams::new(2.0, 32), |result| {
                assert_eq!(result.pixels.len(), result.segment.pixels());
                canvas.blit(&result.segment, result.pixels);
            })
            .unwrap();

        assert!(canvas.is_exactly_covered());
        assert_eq!(report.pixels, area.pixels() as u64);
        assert_eq!(report.devices.len(), 1);
    }

    #[test]
    fn test_history_survives_runs() {
        let mut scheduler = ParallelScheduler::with_devices(config(), vec![cpu(1)]).unwrap();
        let area = Area::new(8, 4);
        let params = FractalParams::new(2.0, 16);

        let first = scheduler.calculate(area, &params, |_| {}).unwrap();
        let second = scheduler.calculate(area, &params, |_| {}).unwrap();

        // per-run counters restart, lifetime counters accumulate
        assert_eq!(first.pixels, 32);
        assert_eq!(second.pixels, 32);
        assert_eq!(scheduler.device_stats()[0].pixels, 64);

        scheduler.reset_statistics();
        assert_eq!(scheduler.device_stats()[0].batches, 0);
    }

    #[test]
    fn test_rejects_bad_input_before_dispatch() {
        let mut scheduler = ParallelScheduler::with_devices(config(), vec![cpu(1)]).unwrap();
        let mut calls = 0;

        let result = scheduler.calculate(Area::new(2, 2), &FractalParams::new(2.0, 16), |_| calls += 1);
        assert!(matches!(result, Err(Error::Config(_))));

        let result = scheduler.calculate(Area::new(8, 8), &FractalParams::new(2.0, 0), |_| calls += 1);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let result = scheduler.calculate(Area::new(8, 8), &FractalParams::new(-2.0, 16), |_| calls += 1);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        assert_eq!(calls, 0);
        assert!(scheduler.devices().iter().all(|state| state.is_idle()));
    }

    #[test]
    fn test_empty_registry() {
        let result = ParallelScheduler::with_registry(config(), DeviceRegistry::new());
        assert!(matches!(result, Err(Error::NoDevices)));
    }
}
