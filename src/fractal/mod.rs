//! Escape-time fractal workload.
//!
//! Each pixel maps to a complex coordinate `c`; the kernel iterates
//! `z <- z^p + c` from `z = 0` until `|z|^2 > 4` or the iteration cap is
//! reached, then shades the count into `[0, 1]`.

pub mod escape;

pub use escape::{escape_time, render_rows, shade, Real};

use crate::area::{Area, Segment};
use crate::error::{Error, Result};

/// WGSL source with one entry point per [`KernelVariant`].
#[cfg(feature = "gpu")]
pub const WGSL_SOURCE: &str = include_str!("escape.wgsl");

/// Complex-plane rectangle mapped onto the whole [`Area`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub min: (f64, f64),
    pub max: (f64, f64),
}

impl Viewport {
    pub fn new(min: (f64, f64), max: (f64, f64)) -> Self {
        Self { min, max }
    }

    /// Complex bounds of `segment` when the viewport spans `area`.
    pub fn segment_bounds(&self, area: Area, segment: &Segment) -> ((f64, f64), (f64, f64)) {
        let step_x = (self.max.0 - self.min.0) / area.width as f64;
        let step_y = (self.max.1 - self.min.1) / area.height as f64;

        let min = (
            self.min.0 + segment.x as f64 * step_x,
            self.min.1 + segment.y as f64 * step_y,
        );
        let max = (
            min.0 + segment.width as f64 * step_x,
            min.1 + segment.height as f64 * step_y,
        );
        (min, max)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new((-2.0, -2.0), (2.0, 2.0))
    }
}

/// Parameters of one fractal run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractalParams {
    pub exponent: f64,
    pub max_iterations: u32,
    pub viewport: Viewport,
}

impl FractalParams {
    pub fn new(exponent: f64, max_iterations: u32) -> Self {
        Self {
            exponent,
            max_iterations,
            viewport: Viewport::default(),
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Reject parameters no kernel variant can iterate.
    ///
    /// The exponent must be finite and positive: `0^p` is undefined for
    /// `p <= 0` and the origin is the first point of every orbit.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::invalid_argument("max_iterations must be > 0"));
        }
        if !self.exponent.is_finite() {
            return Err(Error::invalid_argument("exponent must be finite"));
        }
        if self.exponent <= 0.0 {
            return Err(Error::invalid_argument(format!(
                "exponent must be > 0, got {}",
                self.exponent
            )));
        }
        let (min, max) = (self.viewport.min, self.viewport.max);
        if ![min.0, min.1, max.0, max.1].iter().all(|v| v.is_finite()) {
            return Err(Error::invalid_argument("viewport bounds must be finite"));
        }
        if !(min.0 < max.0 && min.1 < max.1) {
            return Err(Error::invalid_argument(format!(
                "viewport min {:?} must be below max {:?}",
                min, max
            )));
        }
        Ok(())
    }
}

/// Compiled program flavours.
///
/// Integer exponents 1, 2 and 3 get algebraically expanded kernels; every
/// other exponent goes through the polar-form fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    Linear,
    Quadratic,
    Cubic,
    General,
}

impl KernelVariant {
    pub const ALL: [KernelVariant; 4] = [
        KernelVariant::Linear,
        KernelVariant::Quadratic,
        KernelVariant::Cubic,
        KernelVariant::General,
    ];

    /// Pick the program for `exponent`.
    ///
    /// Matching is exact: `2.0` takes the quadratic path, `2.0000001` the
    /// general one.
    #[allow(clippy::float_cmp)]
    pub fn for_exponent(exponent: f64) -> Self {
        if exponent == 1.0 {
            KernelVariant::Linear
        } else if exponent == 2.0 {
            KernelVariant::Quadratic
        } else if exponent == 3.0 {
            KernelVariant::Cubic
        } else {
            KernelVariant::General
        }
    }

    /// Entry point name in [`WGSL_SOURCE`].
    pub fn entry_point(&self) -> &'static str {
        match self {
            KernelVariant::Linear => "escape_linear",
            KernelVariant::Quadratic => "escape_quadratic",
            KernelVariant::Cubic => "escape_cubic",
            KernelVariant::General => "escape_general",
        }
    }
}

/// Arguments of one 2-D kernel launch, one work item per pixel.
///
/// `origin` is the coordinate of pixel `(0, 0)`; `step` was already rounded
/// to the device's working precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchParams {
    pub origin: (f64, f64),
    pub step: (f64, f64),
    pub width: usize,
    pub height: usize,
    pub exponent: f64,
    pub max_iterations: u32,
}

impl LaunchParams {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}
