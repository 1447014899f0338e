use crate::core::matrix::Element;
use num_traits::{Float, NumAssign};
use rustfft::FftNum;
use std::fmt::Display;
use std::iter::Sum;

/// Floating-point scalar the engine is generic over.
///
/// Bundles the numeric capabilities the pipeline needs — `num_traits::Float`
/// for elementary math, `rustfft::FftNum` so the same scalar drives the FFT
/// plans — together with the few conversions that keep double-precision
/// constants exact in either precision. Implemented for `f32` and `f64`;
/// the whole engine monomorphizes over this trait rather than dispatching on
/// precision at runtime.
pub trait Real: Float + FftNum + Element + NumAssign + Sum + Display + 'static {
    /// Narrowing conversion from an `f64` constant.
    fn of(value: f64) -> Self;

    /// Widening conversion back to `f64`.
    fn as_f64(self) -> f64;

    /// Complementary error function, used to seed half-integer incomplete
    /// gamma evaluations.
    fn erfc(self) -> Self;
}

impl Real for f64 {
    #[inline]
    fn of(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }

    #[inline]
    fn erfc(self) -> Self {
        statrs::function::erf::erfc(self)
    }
}

impl Real for f32 {
    #[inline]
    fn of(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn erfc(self) -> Self {
        statrs::function::erf::erfc(f64::from(self)) as f32
    }
}
