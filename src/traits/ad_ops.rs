//! `std::ops` implementations for [`Ad<F>`].
//!
//! Each operator records an opcode to the active tape when an operand is one
//! of its variables.

use std::iter::{Product, Sum};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

use crate::ad::{unwrap_recorded, Ad};
use crate::opcode::OpCode;
use crate::tape::RecorderThreadLocal;

macro_rules! impl_binary_ops {
    ($($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident => $op:ident;)*) => {
        $(
            impl<F: RecorderThreadLocal> $trait for Ad<F> {
                type Output = Self;
                #[inline]
                #[track_caller]
                fn $method(self, rhs: Self) -> Self {
                    self.binary(OpCode::$op, rhs)
                }
            }

            impl<F: RecorderThreadLocal> $assign_trait for Ad<F> {
                #[inline]
                #[track_caller]
                fn $assign_method(&mut self, rhs: Self) {
                    *self = self.binary(OpCode::$op, rhs);
                }
            }
        )*
    };
}

impl_binary_ops! {
    Add, add, AddAssign, add_assign => Add;
    Sub, sub, SubAssign, sub_assign => Sub;
    Mul, mul, MulAssign, mul_assign => Mul;
    Div, div, DivAssign, div_assign => Div;
    Rem, rem, RemAssign, rem_assign => Rem;
}

impl<F: RecorderThreadLocal> Neg for Ad<F> {
    type Output = Self;
    #[inline]
    #[track_caller]
    fn neg(self) -> Self {
        unwrap_recorded(self.try_unary(OpCode::Neg))
    }
}

impl<F: RecorderThreadLocal> Sum for Ad<F> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Ad::constant(F::zero()), |acc, x| acc + x)
    }
}

impl<F: RecorderThreadLocal> Product for Ad<F> {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Ad::constant(F::one()), |acc, x| acc * x)
    }
}

// ──────────────────────────────────────────────
//  Mixed ops: Ad<F> with primitive floats
// ──────────────────────────────────────────────

// The primitive side becomes a pooled constant of the node.
macro_rules! impl_scalar_ops {
    ($f:ty; $($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident => $op:ident;)*) => {
        $(
            impl $trait<$f> for Ad<$f> {
                type Output = Ad<$f>;
                #[inline]
                #[track_caller]
                fn $method(self, rhs: $f) -> Ad<$f> {
                    self.binary(OpCode::$op, Ad::constant(rhs))
                }
            }

            impl $trait<Ad<$f>> for $f {
                type Output = Ad<$f>;
                #[inline]
                #[track_caller]
                fn $method(self, rhs: Ad<$f>) -> Ad<$f> {
                    Ad::constant(self).binary(OpCode::$op, rhs)
                }
            }

            impl $assign_trait<$f> for Ad<$f> {
                #[inline]
                #[track_caller]
                fn $assign_method(&mut self, rhs: $f) {
                    *self = self.binary(OpCode::$op, Ad::constant(rhs));
                }
            }
        )*
    };
}

macro_rules! impl_all_scalar_ops {
    ($($f:ty),*) => {
        $(
            impl_scalar_ops! { $f;
                Add, add, AddAssign, add_assign => Add;
                Sub, sub, SubAssign, sub_assign => Sub;
                Mul, mul, MulAssign, mul_assign => Mul;
                Div, div, DivAssign, div_assign => Div;
                Rem, rem, RemAssign, rem_assign => Rem;
            }
        )*
    };
}

impl_all_scalar_ops!(f32, f64);
