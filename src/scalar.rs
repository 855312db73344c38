//! The [`Scalar`] trait for writing code that records or runs plain.
//!
//! A function written as `fn f<T: Scalar>(x: &[T]) -> T` runs on plain
//! `f64` and, unchanged, records a tape when called with `Ad<f64>`.

use std::fmt::{Debug, Display};

use num_traits::FromPrimitive;

use crate::ad::Ad;
use crate::float::Float;
use crate::tape::RecorderThreadLocal;

/// Numeric type usable on both sides of a recording.
pub trait Scalar:
    num_traits::Float
    + num_traits::FloatConst
    + FromPrimitive
    + Copy
    + Default
    + Debug
    + Display
    + Send
    + 'static
{
    /// The underlying primitive float type.
    type Float: Float;

    /// Lift a plain float to this scalar as a constant.
    fn from_f(val: Self::Float) -> Self;

    /// Extract the primal value.
    fn value(&self) -> Self::Float;
}

impl Scalar for f32 {
    type Float = f32;

    #[inline]
    fn from_f(val: f32) -> Self {
        val
    }

    #[inline]
    fn value(&self) -> f32 {
        *self
    }
}

impl Scalar for f64 {
    type Float = f64;

    #[inline]
    fn from_f(val: f64) -> Self {
        val
    }

    #[inline]
    fn value(&self) -> f64 {
        *self
    }
}

impl<F: RecorderThreadLocal> Scalar for Ad<F> {
    type Float = F;

    #[inline]
    fn from_f(val: F) -> Self {
        Ad::constant(val)
    }

    #[inline]
    fn value(&self) -> F {
        Ad::value(self)
    }
}
