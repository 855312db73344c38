//! `num_traits` implementations for [`Ad<F>`].
//!
//! Everything differentiable records through the inherent methods on
//! [`Ad`]; constants and classification queries read the value only.

use std::num::FpCategory;

use num_traits::{
    Float as NumFloat, FloatConst, FromPrimitive, Num, NumCast, One, Signed, ToPrimitive, Zero,
};

use crate::ad::Ad;
use crate::float::Float;
use crate::tape::RecorderThreadLocal;

// ══════════════════════════════════════════════
//  Basic numeric traits
// ══════════════════════════════════════════════

impl<F: RecorderThreadLocal> Zero for Ad<F> {
    #[inline]
    fn zero() -> Self {
        Ad::constant(F::zero())
    }
    #[inline]
    fn is_zero(&self) -> bool {
        self.value().is_zero()
    }
}

impl<F: RecorderThreadLocal> One for Ad<F> {
    #[inline]
    fn one() -> Self {
        Ad::constant(F::one())
    }
}

impl<F: RecorderThreadLocal> Num for Ad<F> {
    type FromStrRadixErr = F::FromStrRadixErr;
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        F::from_str_radix(str, radix).map(Ad::constant)
    }
}

impl<F: Float> FromPrimitive for Ad<F> {
    #[inline]
    fn from_i64(n: i64) -> Option<Self> {
        F::from_i64(n).map(Ad::constant)
    }
    #[inline]
    fn from_u64(n: u64) -> Option<Self> {
        F::from_u64(n).map(Ad::constant)
    }
    #[inline]
    fn from_f32(n: f32) -> Option<Self> {
        F::from_f32(n).map(Ad::constant)
    }
    #[inline]
    fn from_f64(n: f64) -> Option<Self> {
        F::from_f64(n).map(Ad::constant)
    }
}

impl<F: Float> ToPrimitive for Ad<F> {
    #[inline]
    fn to_i64(&self) -> Option<i64> {
        self.value().to_i64()
    }
    #[inline]
    fn to_u64(&self) -> Option<u64> {
        self.value().to_u64()
    }
    #[inline]
    fn to_f32(&self) -> Option<f32> {
        self.value().to_f32()
    }
    #[inline]
    fn to_f64(&self) -> Option<f64> {
        self.value().to_f64()
    }
}

impl<F: RecorderThreadLocal> NumCast for Ad<F> {
    #[inline]
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        <F as NumCast>::from(n).map(Ad::constant)
    }
}

impl<F: RecorderThreadLocal> Signed for Ad<F> {
    #[inline]
    fn abs(&self) -> Self {
        Ad::abs(*self)
    }
    #[inline]
    fn abs_sub(&self, other: &Self) -> Self {
        if self.value() > other.value() {
            *self - *other
        } else {
            Self::zero()
        }
    }
    #[inline]
    fn signum(&self) -> Self {
        Ad::signum(*self)
    }
    #[inline]
    fn is_positive(&self) -> bool {
        self.value().is_sign_positive()
    }
    #[inline]
    fn is_negative(&self) -> bool {
        self.value().is_sign_negative()
    }
}

macro_rules! float_consts {
    ($($name:ident),* $(,)?) => {
        impl<F: RecorderThreadLocal> FloatConst for Ad<F> {
            $(
                #[inline]
                fn $name() -> Self {
                    Ad::constant(F::$name())
                }
            )*
        }
    };
}

float_consts!(
    E,
    FRAC_1_PI,
    FRAC_1_SQRT_2,
    FRAC_2_PI,
    FRAC_2_SQRT_PI,
    FRAC_PI_2,
    FRAC_PI_3,
    FRAC_PI_4,
    FRAC_PI_6,
    FRAC_PI_8,
    LN_10,
    LN_2,
    LOG10_E,
    LOG2_E,
    PI,
    SQRT_2,
    TAU,
    LOG10_2,
    LOG2_10,
);

// ══════════════════════════════════════════════
//  Float (num_traits::Float)
// ══════════════════════════════════════════════

macro_rules! delegate_unary {
    ($($name:ident),* $(,)?) => {
        $(
            #[inline]
            fn $name(self) -> Self {
                Ad::$name(self)
            }
        )*
    };
}

impl<F: RecorderThreadLocal> NumFloat for Ad<F> {
    fn nan() -> Self {
        Ad::constant(F::nan())
    }
    fn infinity() -> Self {
        Ad::constant(F::infinity())
    }
    fn neg_infinity() -> Self {
        Ad::constant(F::neg_infinity())
    }
    fn neg_zero() -> Self {
        Ad::constant(F::neg_zero())
    }
    fn min_value() -> Self {
        Ad::constant(F::min_value())
    }
    fn min_positive_value() -> Self {
        Ad::constant(F::min_positive_value())
    }
    fn max_value() -> Self {
        Ad::constant(F::max_value())
    }
    fn epsilon() -> Self {
        Ad::constant(F::epsilon())
    }

    fn is_nan(self) -> bool {
        self.value().is_nan()
    }
    fn is_infinite(self) -> bool {
        self.value().is_infinite()
    }
    fn is_finite(self) -> bool {
        self.value().is_finite()
    }
    fn is_normal(self) -> bool {
        self.value().is_normal()
    }
    fn is_sign_positive(self) -> bool {
        self.value().is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.value().is_sign_negative()
    }
    fn classify(self) -> FpCategory {
        self.value().classify()
    }
    fn integer_decode(self) -> (u64, i16, i8) {
        self.value().integer_decode()
    }

    delegate_unary!(
        floor, ceil, round, trunc, fract, abs, signum, recip, sqrt, cbrt, exp, exp2, exp_m1, ln,
        log2, log10, ln_1p, sin, cos, tan, asin, acos, atan, sinh, cosh, tanh, asinh, acosh,
        atanh,
    );

    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }

    fn powi(self, n: i32) -> Self {
        Ad::powi(self, n)
    }

    fn powf(self, n: Self) -> Self {
        Ad::powf(self, n)
    }

    fn log(self, base: Self) -> Self {
        Ad::ln(self) / Ad::ln(base)
    }

    fn sin_cos(self) -> (Self, Self) {
        (Ad::sin(self), Ad::cos(self))
    }

    fn atan2(self, other: Self) -> Self {
        Ad::atan2(self, other)
    }

    fn hypot(self, other: Self) -> Self {
        Ad::hypot(self, other)
    }

    fn max(self, other: Self) -> Self {
        Ad::max(self, other)
    }

    fn min(self, other: Self) -> Self {
        Ad::min(self, other)
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.value() > other.value() {
            self - other
        } else {
            Self::zero()
        }
    }

    fn to_degrees(self) -> Self {
        let factor = F::from(180.0).unwrap_or_else(F::zero) / F::PI();
        self * Ad::constant(factor)
    }

    fn to_radians(self) -> Self {
        let factor = F::PI() / F::from(180.0).unwrap_or_else(F::one);
        self * Ad::constant(factor)
    }
}
