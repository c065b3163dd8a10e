//! Host implementation of the escape-time kernels.

use super::{KernelVariant, LaunchParams};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Floating-point type a kernel runs in.
pub trait Real:
    Copy
    + Debug
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    const ZERO: Self;
    const TWO: Self;
    const THREE: Self;
    const ESCAPE_RADIUS_SQ: Self;

    fn from_f64(value: f64) -> Self;
    fn from_usize(value: usize) -> Self;
    fn to_f64(self) -> f64;
    fn sqrt(self) -> Self;
    fn atan2(self, other: Self) -> Self;
    fn powf(self, exponent: Self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
}

macro_rules! impl_real {
    ($t:ty) => {
        impl Real for $t {
            const ZERO: Self = 0.0;
            const TWO: Self = 2.0;
            const THREE: Self = 3.0;
            const ESCAPE_RADIUS_SQ: Self = 4.0;

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $t
            }

            #[inline]
            fn from_usize(value: usize) -> Self {
                value as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            #[inline]
            fn atan2(self, other: Self) -> Self {
                <$t>::atan2(self, other)
            }

            #[inline]
            fn powf(self, exponent: Self) -> Self {
                <$t>::powf(self, exponent)
            }

            #[inline]
            fn sin(self) -> Self {
                <$t>::sin(self)
            }

            #[inline]
            fn cos(self) -> Self {
                <$t>::cos(self)
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);

/// Count iterations of `z <- z^p + c` until `|z|^2 > 4`, capped at
/// `max_iterations`. Points that never escape return the cap.
#[inline]
pub fn escape_time<T: Real>(
    variant: KernelVariant,
    cr: T,
    ci: T,
    exponent: T,
    max_iterations: u32,
) -> u32 {
    let (mut zr, mut zi) = (T::ZERO, T::ZERO);
    let mut n = 0;

    while n < max_iterations {
        let (pr, pi) = match variant {
            KernelVariant::Linear => (zr, zi),
            KernelVariant::Quadratic => (zr * zr - zi * zi, T::TWO * zr * zi),
            KernelVariant::Cubic => {
                let (zr2, zi2) = (zr * zr, zi * zi);
                (zr * (zr2 - T::THREE * zi2), zi * (T::THREE * zr2 - zi2))
            }
            KernelVariant::General => {
                // atan2(0, 0) picks phase 0 on the first step
                let r = (zr * zr + zi * zi).sqrt().powf(exponent);
                let theta = zi.atan2(zr) * exponent;
                (r * theta.cos(), r * theta.sin())
            }
        };

        zr = pr + cr;
        zi = pi + ci;
        n += 1;

        if zr * zr + zi * zi > T::ESCAPE_RADIUS_SQ {
            break;
        }
    }

    n
}

/// Map an iteration count onto `[0, 1]`: never escaping gives 0, escaping
/// on the first iteration gives 1.
#[inline]
pub fn shade(iterations: u32, max_iterations: u32) -> f32 {
    if max_iterations <= 1 {
        return 0.0;
    }
    let remaining = max_iterations.saturating_sub(iterations) as f32;
    remaining / (max_iterations - 1) as f32
}

/// Fill `out` with rows `first_row..` of the launch grid.
///
/// `out.len()` must be a multiple of `launch.width`.
pub fn render_rows<T: Real>(
    variant: KernelVariant,
    launch: &LaunchParams,
    first_row: usize,
    out: &mut [f32],
) {
    let origin_r = T::from_f64(launch.origin.0);
    let origin_i = T::from_f64(launch.origin.1);
    let step_r = T::from_f64(launch.step.0);
    let step_i = T::from_f64(launch.step.1);
    let exponent = T::from_f64(launch.exponent);

    for (row, line) in out.chunks_exact_mut(launch.width).enumerate() {
        let ci = origin_i + T::from_usize(first_row + row) * step_i;
        for (col, pixel) in line.iter_mut().enumerate() {
            let cr = origin_r + T::from_usize(col) * step_r;
            let n = escape_time(variant, cr, ci, exponent, launch.max_iterations);
            *pixel = shade(n, launch.max_iterations);
        }
    }
}
