//! Opcodes for the operation log.
//!
//! Each opcode is one elementary operation. `eval_forward` and
//! `reverse_partials` evaluate / differentiate a single scalar opcode; the
//! Taylor-coefficient versions live in [`crate::taylor_ops`].
//!
//! Node arguments are `u32`s. Arguments in an opcode's operand range are
//! [`Operand`]-encoded (slot or constant-pool index); the rest are raw
//! auxiliary data (integer exponent, vector id, atomic id, recorded branch).

use std::ops::Range;

use num_traits::Float;

/// Set on an encoded operand that refers to the constant pool.
pub const CONST_FLAG: u32 = 1 << 31;

/// Largest slot index an operand can address.
pub const MAX_SLOT: u32 = CONST_FLAG - 1;

/// A decoded node operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Result slot of an earlier node.
    Slot(u32),
    /// Index into the constant pool.
    Const(u32),
}

impl Operand {
    #[inline]
    pub fn encode(self) -> u32 {
        match self {
            Operand::Slot(s) => s,
            Operand::Const(c) => c | CONST_FLAG,
        }
    }

    #[inline]
    pub fn decode(raw: u32) -> Self {
        if raw & CONST_FLAG != 0 {
            Operand::Const(raw & !CONST_FLAG)
        } else {
            Operand::Slot(raw)
        }
    }
}

/// Comparison carried by [`OpCode::Compare`] and [`OpCode::CondExpr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

impl CompareOp {
    /// Evaluate `a <cmp> b` with IEEE semantics (every ordered comparison with NaN is false).
    #[inline]
    pub fn eval<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Eq => a == b,
            CompareOp::Ge => a >= b,
            CompareOp::Gt => a > b,
            CompareOp::Ne => a != b,
        }
    }

    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            CompareOp::Lt => 0,
            CompareOp::Le => 1,
            CompareOp::Eq => 2,
            CompareOp::Ge => 3,
            CompareOp::Gt => 4,
            CompareOp::Ne => 5,
        }
    }

    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => CompareOp::Lt,
            1 => CompareOp::Le,
            2 => CompareOp::Eq,
            3 => CompareOp::Ge,
            4 => CompareOp::Gt,
            5 => CompareOp::Ne,
            _ => return None,
        })
    }
}

/// Elementary operation codes for the operation log.
///
/// Binary ops take two operands, unary ops one. [`OpCode::Powi`] stores its
/// `i32` exponent reinterpreted as `u32` in argument 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    // ── Structural ──
    /// Independent variable (leaf node); always the first K slots.
    Input,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Powf,
    Atan2,
    Hypot,
    Max,
    Min,

    // ── Unary ──
    Neg,
    Recip,
    Sqrt,
    Cbrt,
    Powi,

    // ── Exp / Log ──
    Exp,
    Exp2,
    ExpM1,
    Ln,
    Log2,
    Log10,
    Ln1p,

    // ── Trig ──
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,

    // ── Hyperbolic ──
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,

    // ── Misc ──
    Abs,
    /// Zero derivative but needed for re-evaluation.
    Signum,
    /// Zero derivative but needed for re-evaluation.
    Floor,
    /// Zero derivative but needed for re-evaluation.
    Ceil,
    /// Zero derivative but needed for re-evaluation.
    Round,
    /// Zero derivative but needed for re-evaluation.
    Trunc,
    Fract,

    // ── Control ──
    /// Comparison of two operands. Args `[left, right, recorded_outcome]`.
    /// The slot holds `1` when the comparison holds, `0` otherwise.
    Compare(CompareOp),
    /// `if left <cmp> right { if_true } else { if_false }`.
    /// Args `[left, right, if_true, if_false, recorded_branch]`.
    CondExpr(CompareOp),

    // ── Taped vectors ──
    /// Args `[vector, index]`.
    Load,
    /// Args `[vector, index, value]`.
    Store,

    // ── Atomic ──
    /// Args `[atomic, n_out, inputs...]`. Followed by `n_out` [`OpCode::AtomicOut`] nodes.
    AtomicCall,
    /// Args `[call_slot, k]`: output `k` of the preceding call.
    AtomicOut,
}

macro_rules! opcode_tags {
    ($($op:ident = $tag:literal),* $(,)?) => {
        impl OpCode {
            /// Stable wire tag (the comparison, if any, goes in the payload byte).
            pub fn tag(self) -> u8 {
                match self {
                    $(OpCode::$op => $tag,)*
                    OpCode::Compare(_) => 42,
                    OpCode::CondExpr(_) => 43,
                }
            }

            /// Inverse of [`tag`](Self::tag) plus [`payload`](Self::payload).
            /// `None` for unknown tags or an invalid comparison payload.
            pub fn from_tag(tag: u8, payload: u8) -> Option<Self> {
                match tag {
                    $($tag => Some(OpCode::$op),)*
                    42 => CompareOp::from_tag(payload).map(OpCode::Compare),
                    43 => CompareOp::from_tag(payload).map(OpCode::CondExpr),
                    _ => None,
                }
            }
        }
    };
}

opcode_tags! {
    Input = 0,
    Add = 1, Sub = 2, Mul = 3, Div = 4, Rem = 5,
    Powf = 6, Atan2 = 7, Hypot = 8, Max = 9, Min = 10,
    Neg = 11, Recip = 12, Sqrt = 13, Cbrt = 14, Powi = 15,
    Exp = 16, Exp2 = 17, ExpM1 = 18, Ln = 19, Log2 = 20, Log10 = 21, Ln1p = 22,
    Sin = 23, Cos = 24, Tan = 25, Asin = 26, Acos = 27, Atan = 28,
    Sinh = 29, Cosh = 30, Tanh = 31, Asinh = 32, Acosh = 33, Atanh = 34,
    Abs = 35, Signum = 36, Floor = 37, Ceil = 38, Round = 39, Trunc = 40, Fract = 41,
    Load = 44, Store = 45, AtomicCall = 46, AtomicOut = 47,
}

impl OpCode {
    /// Payload byte stored next to the tag.
    #[inline]
    pub fn payload(self) -> u8 {
        match self {
            OpCode::Compare(c) | OpCode::CondExpr(c) => c.tag(),
            _ => 0,
        }
    }

    #[inline]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Rem
                | OpCode::Powf
                | OpCode::Atan2
                | OpCode::Hypot
                | OpCode::Max
                | OpCode::Min
        )
    }

    #[inline]
    pub fn is_unary(self) -> bool {
        !self.is_binary()
            && !matches!(
                self,
                OpCode::Input
                    | OpCode::Powi
                    | OpCode::Compare(_)
                    | OpCode::CondExpr(_)
                    | OpCode::Load
                    | OpCode::Store
                    | OpCode::AtomicCall
                    | OpCode::AtomicOut
            )
    }

    /// Rounding-type ops whose derivative is zero everywhere it exists.
    #[inline]
    pub fn is_piecewise_constant(self) -> bool {
        matches!(
            self,
            OpCode::Signum | OpCode::Floor | OpCode::Ceil | OpCode::Round | OpCode::Trunc
        )
    }

    /// Fixed argument count, or `None` for [`OpCode::AtomicCall`].
    pub fn arity(self) -> Option<usize> {
        Some(match self {
            OpCode::Input => 0,
            OpCode::Powi | OpCode::Load | OpCode::AtomicOut => 2,
            OpCode::Compare(_) | OpCode::Store => 3,
            OpCode::CondExpr(_) => 5,
            OpCode::AtomicCall => return None,
            op if op.is_binary() => 2,
            _ => 1,
        })
    }

    /// Positions within the node's arguments that hold encoded operands.
    pub fn operand_range(self, nargs: usize) -> Range<usize> {
        match self {
            OpCode::Input | OpCode::AtomicOut => 0..0,
            OpCode::Powi => 0..1,
            OpCode::Compare(_) => 0..2,
            OpCode::CondExpr(_) => 0..4,
            OpCode::Load => 1..2,
            OpCode::Store => 1..3,
            OpCode::AtomicCall => 2..nargs.max(2),
            op if op.is_binary() => 0..2,
            _ => 0..1,
        }
    }
}

/// Evaluate a single arithmetic or math opcode.
///
/// For unary ops `b` is ignored, except [`OpCode::Powi`] where `b` is the
/// exponent. Recording and the order-0 forward sweep both go through here,
/// so replayed values are bit-identical to recorded ones.
#[inline]
pub(crate) fn eval_forward<T: Float>(op: OpCode, a: T, b: T) -> T {
    match op {
        // Binary arithmetic
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Rem => a % b,
        OpCode::Powf => a.powf(b),
        OpCode::Atan2 => a.atan2(b),
        OpCode::Hypot => a.hypot(b),
        OpCode::Max => {
            if a >= b {
                a
            } else {
                b
            }
        }
        OpCode::Min => {
            if a <= b {
                a
            } else {
                b
            }
        }

        // Unary
        OpCode::Neg => -a,
        OpCode::Recip => a.recip(),
        OpCode::Sqrt => a.sqrt(),
        OpCode::Cbrt => a.cbrt(),
        OpCode::Powi => a.powi(b.to_i32().unwrap_or(0)),

        // Exp/Log
        OpCode::Exp => a.exp(),
        OpCode::Exp2 => a.exp2(),
        OpCode::ExpM1 => a.exp_m1(),
        OpCode::Ln => a.ln(),
        OpCode::Log2 => a.log2(),
        OpCode::Log10 => a.log10(),
        OpCode::Ln1p => a.ln_1p(),

        // Trig
        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
        OpCode::Tan => a.tan(),
        OpCode::Asin => a.asin(),
        OpCode::Acos => a.acos(),
        OpCode::Atan => a.atan(),

        // Hyperbolic
        OpCode::Sinh => a.sinh(),
        OpCode::Cosh => a.cosh(),
        OpCode::Tanh => a.tanh(),
        OpCode::Asinh => a.asinh(),
        OpCode::Acosh => a.acosh(),
        OpCode::Atanh => a.atanh(),

        // Misc
        OpCode::Abs => a.abs(),
        OpCode::Signum => a.signum(),
        OpCode::Floor => a.floor(),
        OpCode::Ceil => a.ceil(),
        OpCode::Round => a.round(),
        OpCode::Trunc => a.trunc(),
        OpCode::Fract => a.fract(),

        OpCode::Input
        | OpCode::Compare(_)
        | OpCode::CondExpr(_)
        | OpCode::Load
        | OpCode::Store
        | OpCode::AtomicCall
        | OpCode::AtomicOut => unreachable!("{op:?} is evaluated by the sweep itself"),
    }
}

/// Reverse-mode partial derivatives of a single opcode.
///
/// Returns `(∂result/∂a, ∂result/∂b)`; for unary ops the second partial is
/// zero. `r` is the result value.
#[inline]
pub(crate) fn reverse_partials<T: Float>(op: OpCode, a: T, b: T, r: T) -> (T, T) {
    let zero = T::zero();
    let one = T::one();
    match op {
        // Binary
        OpCode::Add => (one, one),
        OpCode::Sub => (one, -one),
        OpCode::Mul => (b, a),
        OpCode::Div => {
            let inv = one / b;
            (inv, -a * inv * inv)
        }
        OpCode::Rem => (one, -(a / b).trunc()),
        OpCode::Powf => {
            // d/da a^b = b * a^(b-1), d/db a^b = a^b * ln(a)
            let da = b * a.powf(b - one);
            let db = if r == zero { zero } else { r * a.ln() };
            (da, db)
        }
        OpCode::Atan2 => {
            let denom = a * a + b * b;
            (b / denom, -a / denom)
        }
        OpCode::Hypot => (a / r, b / r),
        OpCode::Max => {
            if a >= b {
                (one, zero)
            } else {
                (zero, one)
            }
        }
        OpCode::Min => {
            if a <= b {
                (one, zero)
            } else {
                (zero, one)
            }
        }

        // Unary
        OpCode::Neg => (-one, zero),
        OpCode::Recip => {
            let inv = one / a;
            (-inv * inv, zero)
        }
        OpCode::Sqrt => ((one + one).recip() / r, zero),
        OpCode::Cbrt => {
            let three = one + one + one;
            (one / (three * r * r), zero)
        }
        OpCode::Powi => {
            let exp = b.to_i32().unwrap_or(0);
            if exp == 0 {
                (zero, zero)
            } else if let Some(e) = exp.checked_sub(1) {
                (b * a.powi(e), zero)
            } else {
                // a^(n-1) = a^n / a
                (b * r / a, zero)
            }
        }

        // Exp/Log
        OpCode::Exp => (r, zero),
        OpCode::Exp2 => (r * (one + one).ln(), zero),
        OpCode::ExpM1 => (r + one, zero),
        OpCode::Ln => (one / a, zero),
        OpCode::Log2 => (one / (a * (one + one).ln()), zero),
        OpCode::Log10 => (one / (a * T::from(10.0).unwrap_or(one).ln()), zero),
        OpCode::Ln1p => (one / (one + a), zero),

        // Trig
        OpCode::Sin => (a.cos(), zero),
        OpCode::Cos => (-a.sin(), zero),
        OpCode::Tan => (one + r * r, zero),
        OpCode::Asin => (one / (one - a * a).sqrt(), zero),
        OpCode::Acos => (-one / (one - a * a).sqrt(), zero),
        OpCode::Atan => (one / (one + a * a), zero),

        // Hyperbolic
        OpCode::Sinh => (a.cosh(), zero),
        OpCode::Cosh => (a.sinh(), zero),
        OpCode::Tanh => (one - r * r, zero),
        OpCode::Asinh => (one / (a * a + one).sqrt(), zero),
        OpCode::Acosh => (one / (a * a - one).sqrt(), zero),
        OpCode::Atanh => (one / (one - a * a), zero),

        // Misc
        OpCode::Abs => (a.signum(), zero),
        OpCode::Signum | OpCode::Floor | OpCode::Ceil | OpCode::Round | OpCode::Trunc => {
            (zero, zero)
        }
        OpCode::Fract => (one, zero),

        OpCode::Input
        | OpCode::Compare(_)
        | OpCode::CondExpr(_)
        | OpCode::Load
        | OpCode::Store
        | OpCode::AtomicCall
        | OpCode::AtomicOut => (zero, zero),
    }
}

/// Encode a `powi` exponent as a raw argument.
#[inline]
pub fn powi_exp_encode(exp: i32) -> u32 {
    exp as u32
}

/// Decode a `powi` exponent from its raw argument.
#[inline]
pub fn powi_exp_decode(raw: u32) -> i32 {
    raw as i32
}
