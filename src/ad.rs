//! The tagged scalar recorded on a [`Tape`](crate::Tape).
//!
//! An [`Ad<F>`] is either a plain constant or a variable bound to a node of
//! one recording. Arithmetic on `Ad` values computes the ordinary result and,
//! when any operand is a variable of the tape recording on this thread,
//! appends a node to that tape.
//!
//! Operators cannot return errors. Misuse that the recorder detects, such as
//! combining variables of a tape recording on another thread, panics with the
//! [`AdError`] message; the `try_*` methods report the same conditions as
//! values.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::{self, CompareOp, OpCode};
use crate::tape::{record, Arg, NodeRef, RecorderThreadLocal, TapeId};

#[derive(Clone, Copy, Debug)]
enum Repr<F> {
    Constant(F),
    Variable { value: F, node: NodeRef },
}

/// Scalar that is either a constant or a recorded variable.
///
/// `Copy`, and `Send`: a variable only names its tape and slot.
#[derive(Clone, Copy, Debug)]
pub struct Ad<F: Float> {
    repr: Repr<F>,
}

impl<F: Float> Ad<F> {
    /// A constant; never recorded.
    #[inline]
    pub fn constant(value: F) -> Self {
        Ad {
            repr: Repr::Constant(value),
        }
    }

    #[inline]
    pub(crate) fn variable(value: F, node: NodeRef) -> Self {
        Ad {
            repr: Repr::Variable { value, node },
        }
    }

    /// The value computed during recording.
    #[inline]
    pub fn value(&self) -> F {
        match self.repr {
            Repr::Constant(v) | Repr::Variable { value: v, .. } => v,
        }
    }

    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self.repr, Repr::Variable { .. })
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        !self.is_variable()
    }

    /// Tape this variable belongs to.
    #[inline]
    pub fn tape_id(&self) -> Option<TapeId> {
        self.node_ref().map(NodeRef::tape)
    }

    /// Node reference of a variable.
    pub fn node(&self) -> Result<NodeRef> {
        self.node_ref().ok_or(AdError::NotAVariable)
    }

    #[inline]
    pub(crate) fn node_ref(&self) -> Option<NodeRef> {
        match self.repr {
            Repr::Constant(_) => None,
            Repr::Variable { node, .. } => Some(node),
        }
    }
}

impl<F: Float> From<F> for Ad<F> {
    #[inline]
    fn from(value: F) -> Self {
        Ad::constant(value)
    }
}

impl<F: Float> Default for Ad<F> {
    fn default() -> Self {
        Ad::constant(F::zero())
    }
}

impl<F: Float> Display for Ad<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cold]
#[track_caller]
fn fail_fast<T>(result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{e}"),
    }
}

#[inline]
#[track_caller]
pub(crate) fn unwrap_recorded<T>(result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        err => fail_fast(err),
    }
}

macro_rules! unary_methods {
    ($($(#[$doc:meta])* $name:ident => $op:ident),* $(,)?) => {
        impl<F: RecorderThreadLocal> Ad<F> {
            $(
                $(#[$doc])*
                #[inline]
                #[track_caller]
                pub fn $name(self) -> Self {
                    unwrap_recorded(self.try_unary(OpCode::$op))
                }
            )*
        }
    };
}

unary_methods! {
    sqrt => Sqrt, cbrt => Cbrt, recip => Recip,
    exp => Exp, exp2 => Exp2, exp_m1 => ExpM1,
    ln => Ln, log2 => Log2, log10 => Log10, ln_1p => Ln1p,
    sin => Sin, cos => Cos, tan => Tan,
    asin => Asin, acos => Acos, atan => Atan,
    sinh => Sinh, cosh => Cosh, tanh => Tanh,
    asinh => Asinh, acosh => Acosh, atanh => Atanh,
    /// Derivative `signum(x)`, so `1` at `+0`.
    abs => Abs,
    signum => Signum, floor => Floor, ceil => Ceil, round => Round, trunc => Trunc,
    fract => Fract,
}

impl<F: RecorderThreadLocal> Ad<F> {
    /// Apply a unary opcode, reporting recorder errors.
    pub fn try_unary(self, op: OpCode) -> Result<Self> {
        if !op.is_unary() {
            return Err(AdError::InvalidOpcode(op));
        }
        let value = opcode::eval_forward(op, self.value(), F::zero());
        record(op, &[Arg::Operand(&self)], value)
    }

    /// Apply a binary opcode, reporting recorder errors.
    pub fn try_binary(self, op: OpCode, rhs: Self) -> Result<Self> {
        if !op.is_binary() {
            return Err(AdError::InvalidOpcode(op));
        }
        let value = opcode::eval_forward(op, self.value(), rhs.value());
        record(op, &[Arg::Operand(&self), Arg::Operand(&rhs)], value)
    }

    /// `self^n`, with the exponent fixed at record time.
    pub fn try_powi(self, n: i32) -> Result<Self> {
        let value = self.value().powi(n);
        record(
            OpCode::Powi,
            &[Arg::Operand(&self), Arg::Raw(opcode::powi_exp_encode(n))],
            value,
        )
    }

    #[inline]
    #[track_caller]
    pub(crate) fn binary(self, op: OpCode, rhs: Self) -> Self {
        unwrap_recorded(self.try_binary(op, rhs))
    }

    #[inline]
    #[track_caller]
    pub fn powi(self, n: i32) -> Self {
        unwrap_recorded(self.try_powi(n))
    }

    #[inline]
    #[track_caller]
    pub fn powf(self, n: Self) -> Self {
        self.binary(OpCode::Powf, n)
    }

    #[inline]
    #[track_caller]
    pub fn atan2(self, other: Self) -> Self {
        self.binary(OpCode::Atan2, other)
    }

    #[inline]
    #[track_caller]
    pub fn hypot(self, other: Self) -> Self {
        self.binary(OpCode::Hypot, other)
    }

    /// Ties pick `self`.
    #[inline]
    #[track_caller]
    pub fn max(self, other: Self) -> Self {
        self.binary(OpCode::Max, other)
    }

    /// Ties pick `self`.
    #[inline]
    #[track_caller]
    pub fn min(self, other: Self) -> Self {
        self.binary(OpCode::Min, other)
    }

    /// Record the ordering of `self` and `other`, so a replay can count
    /// comparisons whose outcome changed.
    pub fn try_compare(&self, other: &Self) -> Result<Option<Ordering>> {
        let ordering = self.value().partial_cmp(&other.value());
        let (cmp, outcome) = match ordering {
            Some(Ordering::Less) => (CompareOp::Lt, true),
            Some(Ordering::Greater) => (CompareOp::Gt, true),
            Some(Ordering::Equal) => (CompareOp::Eq, true),
            None => (CompareOp::Eq, false),
        };
        let flag = if outcome { F::one() } else { F::zero() };
        record(
            OpCode::Compare(cmp),
            &[
                Arg::Operand(self),
                Arg::Operand(other),
                Arg::Raw(outcome as u32),
            ],
            flag,
        )?;
        Ok(ordering)
    }

    /// Recorded conditional: `if left <cmp> right { if_true } else { if_false }`.
    ///
    /// Unlike a host `if`, both branches are kept on the tape, so a replay
    /// can take the other branch. See
    /// [`BranchPolicy`](crate::function::BranchPolicy).
    pub fn try_cond_exp(
        cmp: CompareOp,
        left: Self,
        right: Self,
        if_true: Self,
        if_false: Self,
    ) -> Result<Self> {
        let taken = cmp.eval(left.value(), right.value());
        let value = if taken {
            if_true.value()
        } else {
            if_false.value()
        };
        record(
            OpCode::CondExpr(cmp),
            &[
                Arg::Operand(&left),
                Arg::Operand(&right),
                Arg::Operand(&if_true),
                Arg::Operand(&if_false),
                Arg::Raw(taken as u32),
            ],
            value,
        )
    }

    #[track_caller]
    pub fn cond_exp(cmp: CompareOp, left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        unwrap_recorded(Self::try_cond_exp(cmp, left, right, if_true, if_false))
    }

    #[track_caller]
    pub fn cond_lt(left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        Self::cond_exp(CompareOp::Lt, left, right, if_true, if_false)
    }

    #[track_caller]
    pub fn cond_le(left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        Self::cond_exp(CompareOp::Le, left, right, if_true, if_false)
    }

    #[track_caller]
    pub fn cond_eq(left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        Self::cond_exp(CompareOp::Eq, left, right, if_true, if_false)
    }

    #[track_caller]
    pub fn cond_ge(left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        Self::cond_exp(CompareOp::Ge, left, right, if_true, if_false)
    }

    #[track_caller]
    pub fn cond_gt(left: Self, right: Self, if_true: Self, if_false: Self) -> Self {
        Self::cond_exp(CompareOp::Gt, left, right, if_true, if_false)
    }
}

// Comparisons look at values. Involving a variable, they also leave a
// Compare node on the tape.

impl<F: RecorderThreadLocal> PartialEq for Ad<F> {
    #[track_caller]
    fn eq(&self, other: &Self) -> bool {
        unwrap_recorded(self.try_compare(other)) == Some(Ordering::Equal)
    }
}

impl<F: RecorderThreadLocal> PartialOrd for Ad<F> {
    #[track_caller]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        unwrap_recorded(self.try_compare(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_do_not_record() {
        let a = Ad::constant(2.0_f64);
        let b = Ad::constant(3.0_f64);
        let c = a.binary(OpCode::Mul, b).sin();
        assert!(c.is_constant());
        assert_eq!(c.value(), 6.0_f64.sin());
        assert!(matches!(c.node(), Err(AdError::NotAVariable)));
    }

    #[test]
    fn non_unary_opcode_is_rejected() {
        let a = Ad::constant(1.0_f32);
        assert!(matches!(
            a.try_unary(OpCode::Add),
            Err(AdError::InvalidOpcode(OpCode::Add))
        ));
    }

    #[test]
    fn compare_reports_value_ordering() {
        let a = Ad::constant(1.0_f64);
        let b = Ad::constant(f64::NAN);
        assert!(a < Ad::constant(2.0));
        assert_eq!(a.partial_cmp(&b), None);
    }
}
