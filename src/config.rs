use crate::device::Precision;
use crate::error::{Error, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Width of one fragment in pixels; segments are whole multiples of it
    /// except at the right edge of the area.
    pub fragment_width: usize,
    pub fragment_height: usize,

    /// Fragments requested for a device's very first batch.
    pub initial_fragment_count: usize,
    /// Upper bound on fragments per batch; also sizes staging buffers.
    pub max_fragment_count: usize,

    /// Wall-clock time each batch should take once throughput is known.
    pub target_batch_duration: Duration,

    /// Leave one CPU compute unit free for the controlling process.
    pub reserve_host_core: bool,

    /// Kernel precision. `None` picks double where a device supports it.
    pub precision: Option<Precision>,

    pub cpu_compute_units: Option<usize>,

    #[cfg(feature = "gpu")]
    pub enable_gpu: bool,

    #[cfg(feature = "telemetry")]
    pub enable_telemetry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fragment_width: 64,
            fragment_height: 16,
            initial_fragment_count: 1,
            max_fragment_count: 256,
            target_batch_duration: Duration::from_millis(50),
            reserve_host_core: true,
            precision: None,
            cpu_compute_units: None,

            #[cfg(feature = "gpu")]
            enable_gpu: true,

            #[cfg(feature = "telemetry")]
            enable_telemetry: true,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.fragment_width == 0 || self.fragment_height == 0 {
            return Err(Error::config("fragment dimensions must be > 0"));
        }

        if self.initial_fragment_count == 0 {
            return Err(Error::config("initial_fragment_count must be > 0"));
        }

        if self.max_fragment_count < self.initial_fragment_count {
            return Err(Error::config(
                "max_fragment_count must be >= initial_fragment_count",
            ));
        }

        if self.target_batch_duration.is_zero() {
            return Err(Error::config("target_batch_duration must be > 0"));
        }

        if self.cpu_compute_units == Some(0) {
            return Err(Error::config("cpu_compute_units must be > 0"));
        }

        Ok(())
    }

    /// Largest segment the partitioner can ever hand out.
    pub fn max_segment(&self) -> (usize, usize) {
        (
            self.max_fragment_count.saturating_mul(self.fragment_width),
            self.fragment_height,
        )
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn fragment_size(mut self, width: usize, height: usize) -> Self {
        self.config.fragment_width = width;
        self.config.fragment_height = height;
        self
    }

    pub fn initial_fragment_count(mut self, count: usize) -> Self {
        self.config.initial_fragment_count = count;
        self
    }

    pub fn max_fragment_count(mut self, count: usize) -> Self {
        self.config.max_fragment_count = count;
        self
    }

    pub fn target_batch_duration(mut self, duration: Duration) -> Self {
        self.config.target_batch_duration = duration;
        self
    }

    pub fn reserve_host_core(mut self, reserve: bool) -> Self {
        self.config.reserve_host_core = reserve;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.config.precision = Some(precision);
        self
    }

    pub fn cpu_compute_units(mut self, units: usize) -> Self {
        self.config.cpu_compute_units = Some(units);
        self
    }

    #[cfg(feature = "gpu")]
    pub fn enable_gpu(mut self, enable: bool) -> Self {
        self.config.enable_gpu = enable;
        self
    }

    #[cfg(feature = "telemetry")]
    pub fn enable_telemetry(mut self, enable: bool) -> Self {
        self.config.enable_telemetry = enable;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
