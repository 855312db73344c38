//! Taylor coefficient kernels for higher-order sweeps.
//!
//! Convention: `c[k] = f^(k)(t₀) / k!` (normalized Taylor coefficients).
//! Kernels read operand series `&[F]` and write `&mut [F]`; the number of
//! coefficients is `c.len()`, and operands must be at least that long.
//!
//! `eval_series` propagates one opcode forward. `partial_series` gives
//! the Taylor series of an opcode's local partials, which the reverse sweep
//! multiplies into the adjoint series (forward-over-reverse).

use num_traits::Float;

use crate::opcode::OpCode;

/// Scratch buffers reused across kernel calls.
#[derive(Clone, Debug, Default)]
pub struct Workspace<F> {
    s1: Vec<F>,
    s2: Vec<F>,
    s3: Vec<F>,
}

impl<F: Float> Workspace<F> {
    pub fn new() -> Self {
        Workspace {
            s1: Vec::new(),
            s2: Vec::new(),
            s3: Vec::new(),
        }
    }

    #[allow(clippy::type_complexity)]
    fn split(&mut self, n: usize) -> (&mut [F], &mut [F], &mut [F]) {
        for s in [&mut self.s1, &mut self.s2, &mut self.s3] {
            s.clear();
            s.resize(n, F::zero());
        }
        (&mut self.s1[..n], &mut self.s2[..n], &mut self.s3[..n])
    }
}

#[inline]
fn int<F: Float>(k: usize) -> F {
    F::from(k).unwrap_or_else(F::zero)
}

// ══════════════════════════════════════════════
//  Elementwise
// ══════════════════════════════════════════════

/// `c = [v, 0, 0, ...]`
#[inline]
pub fn constant<F: Float>(v: F, c: &mut [F]) {
    for ck in c.iter_mut() {
        *ck = F::zero();
    }
    if let Some(c0) = c.first_mut() {
        *c0 = v;
    }
}

#[inline]
pub fn add<F: Float>(a: &[F], b: &[F], c: &mut [F]) {
    for k in 0..c.len() {
        c[k] = a[k] + b[k];
    }
}

#[inline]
pub fn sub<F: Float>(a: &[F], b: &[F], c: &mut [F]) {
    for k in 0..c.len() {
        c[k] = a[k] - b[k];
    }
}

/// `c = s * a`
#[inline]
pub fn scale<F: Float>(a: &[F], s: F, c: &mut [F]) {
    for k in 0..c.len() {
        c[k] = s * a[k];
    }
}

#[inline]
fn negate_in_place<F: Float>(c: &mut [F]) {
    for ck in c.iter_mut() {
        *ck = -*ck;
    }
}

// ══════════════════════════════════════════════
//  Products and quotients
// ══════════════════════════════════════════════

/// Cauchy product `c[k] = Σ_{j=0}^{k} a[j] b[k-j]`.
#[inline]
pub fn mul<F: Float>(a: &[F], b: &[F], c: &mut [F]) {
    for k in 0..c.len() {
        let mut sum = F::zero();
        for j in 0..=k {
            sum = sum + a[j] * b[k - j];
        }
        c[k] = sum;
    }
}

/// `acc += a * b` (truncated Cauchy product). Used for adjoint accumulation.
#[inline]
pub fn mul_acc<F: Float>(a: &[F], b: &[F], acc: &mut [F]) {
    for k in 0..acc.len() {
        let mut sum = F::zero();
        for j in 0..=k {
            sum = sum + a[j] * b[k - j];
        }
        acc[k] = acc[k] + sum;
    }
}

/// `c[k] = (a[k] - Σ_{j=1}^{k} b[j] c[k-j]) / b[0]`
#[inline]
pub fn div<F: Float>(a: &[F], b: &[F], c: &mut [F]) {
    let inv_b0 = F::one() / b[0];
    for k in 0..c.len() {
        let mut sum = a[k];
        for j in 1..=k {
            sum = sum - b[j] * c[k - j];
        }
        c[k] = sum * inv_b0;
    }
}

/// `c = 1/a`
#[inline]
pub fn recip<F: Float>(a: &[F], c: &mut [F]) {
    let inv_a0 = F::one() / a[0];
    c[0] = inv_a0;
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..=k {
            sum = sum + a[j] * c[k - j];
        }
        c[k] = -sum * inv_a0;
    }
}

/// `c = a^n` for `n >= 0` by repeated squaring; exact at `a[0] = 0`.
fn powu<F: Float>(a: &[F], mut n: u32, c: &mut [F], base: &mut [F], tmp: &mut [F]) {
    constant(F::one(), c);
    base.copy_from_slice(&a[..base.len()]);
    while n > 0 {
        if n & 1 == 1 {
            mul(c, base, tmp);
            c.copy_from_slice(tmp);
        }
        n >>= 1;
        if n > 0 {
            mul(base, base, tmp);
            base.copy_from_slice(tmp);
        }
    }
}

/// `c = a^n` (integer power).
pub fn powi<F: Float>(a: &[F], n: i32, c: &mut [F], s1: &mut [F], s2: &mut [F], s3: &mut [F]) {
    if n >= 0 {
        powu(a, n.unsigned_abs(), c, s1, s2);
    } else {
        powu(a, n.unsigned_abs(), s1, s2, s3);
        recip(s1, c);
    }
    c[0] = a[0].powi(n);
}

// ══════════════════════════════════════════════
//  Transcendentals (logarithmic derivative technique)
// ══════════════════════════════════════════════

/// Given `c' = a' * g`, fill `c[1..]` by `c[k] = (1/k) Σ_{j=1}^{k} j a[j] g[k-j]`.
#[inline]
fn integrate<F: Float>(a: &[F], g: &[F], c: &mut [F]) {
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..=k {
            sum = sum + int::<F>(j) * a[j] * g[k - j];
        }
        c[k] = sum / int(k);
    }
}

/// `c = exp(a)`
#[inline]
pub fn exp<F: Float>(a: &[F], c: &mut [F]) {
    c[0] = a[0].exp();
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..=k {
            sum = sum + int::<F>(j) * a[j] * c[k - j];
        }
        c[k] = sum / int(k);
    }
}

/// `c = ln(a)`: `c[k] = (a[k] - (1/k) Σ_{j=1}^{k-1} j c[j] a[k-j]) / a[0]`
#[inline]
pub fn ln<F: Float>(a: &[F], c: &mut [F]) {
    let inv_a0 = F::one() / a[0];
    c[0] = a[0].ln();
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..k {
            sum = sum + int::<F>(j) * c[j] * a[k - j];
        }
        c[k] = (a[k] - sum / int(k)) * inv_a0;
    }
}

/// `c = sqrt(a)`: `c[k] = (a[k] - Σ_{j=1}^{k-1} c[j] c[k-j]) / (2 c[0])`
#[inline]
pub fn sqrt<F: Float>(a: &[F], c: &mut [F]) {
    c[0] = a[0].sqrt();
    let two_c0 = (F::one() + F::one()) * c[0];
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..k {
            sum = sum + c[j] * c[k - j];
        }
        c[k] = (a[k] - sum) / two_c0;
    }
}

/// Coupled `(sin(a), cos(a))`.
#[inline]
pub fn sin_cos<F: Float>(a: &[F], s: &mut [F], co: &mut [F]) {
    let (s0, c0) = a[0].sin_cos();
    s[0] = s0;
    co[0] = c0;
    for k in 1..s.len() {
        let mut sum_s = F::zero();
        let mut sum_c = F::zero();
        for j in 1..=k {
            let ja = int::<F>(j) * a[j];
            sum_s = sum_s + ja * co[k - j];
            sum_c = sum_c + ja * s[k - j];
        }
        s[k] = sum_s / int(k);
        co[k] = -sum_c / int(k);
    }
}

/// Coupled `(sinh(a), cosh(a))`.
#[inline]
pub fn sinh_cosh<F: Float>(a: &[F], sh: &mut [F], ch: &mut [F]) {
    sh[0] = a[0].sinh();
    ch[0] = a[0].cosh();
    for k in 1..sh.len() {
        let mut sum_sh = F::zero();
        let mut sum_ch = F::zero();
        for j in 1..=k {
            let ja = int::<F>(j) * a[j];
            sum_sh = sum_sh + ja * ch[k - j];
            sum_ch = sum_ch + ja * sh[k - j];
        }
        sh[k] = sum_sh / int(k);
        ch[k] = sum_ch / int(k);
    }
}

/// `c = tan(a)` via `c' = a' (1 + c²)`; `sq` carries the running `1 + c²`.
pub fn tan<F: Float>(a: &[F], c: &mut [F], sq: &mut [F]) {
    c[0] = a[0].tan();
    sq[0] = F::one() + c[0] * c[0];
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..=k {
            sum = sum + int::<F>(j) * a[j] * sq[k - j];
        }
        c[k] = sum / int(k);
        let mut s_k = F::zero();
        for j in 0..=k {
            s_k = s_k + c[j] * c[k - j];
        }
        sq[k] = s_k;
    }
}

/// `c = tanh(a)` via `c' = a' (1 - c²)`.
pub fn tanh<F: Float>(a: &[F], c: &mut [F], sq: &mut [F]) {
    c[0] = a[0].tanh();
    sq[0] = F::one() - c[0] * c[0];
    for k in 1..c.len() {
        let mut sum = F::zero();
        for j in 1..=k {
            sum = sum + int::<F>(j) * a[j] * sq[k - j];
        }
        c[k] = sum / int(k);
        let mut s_k = F::zero();
        for j in 0..=k {
            s_k = s_k + c[j] * c[k - j];
        }
        sq[k] = -s_k;
    }
}

/// `g = (shift ± a²)^(-1/2)` or `(shift ± a²)^(-1)`, the derivative factor
/// shared by the inverse trig / hyperbolic functions.
fn inverse_factor<F: Float>(
    a: &[F],
    sign: F,
    shift: F,
    root: bool,
    g: &mut [F],
    s1: &mut [F],
    s2: &mut [F],
) {
    mul(a, a, s1);
    for v in s1.iter_mut() {
        *v = sign * *v;
    }
    s1[0] = s1[0] + shift;
    if root {
        sqrt(s1, s2);
        recip(s2, g);
    } else {
        recip(s1, g);
    }
}

// ══════════════════════════════════════════════
//  Forward propagation of one opcode
// ══════════════════════════════════════════════

/// Taylor coefficients of `op(a, b)` into `c`. `exp` is the [`OpCode::Powi`]
/// exponent; unary ops ignore `b`.
pub(crate) fn eval_series<F: Float>(
    op: OpCode,
    a: &[F],
    b: &[F],
    exp_i: i32,
    c: &mut [F],
    ws: &mut Workspace<F>,
) {
    let n = c.len();
    let one = F::one();
    let (s1, s2, s3) = ws.split(n);
    match op {
        OpCode::Add => add(a, b, c),
        OpCode::Sub => sub(a, b, c),
        OpCode::Mul => mul(a, b, c),
        OpCode::Div => div(a, b, c),
        OpCode::Rem => {
            let t = (a[0] / b[0]).trunc();
            for k in 0..n {
                c[k] = a[k] - t * b[k];
            }
            c[0] = a[0] % b[0];
        }
        OpCode::Powf => {
            ln(a, s1);
            mul(b, s1, s2);
            exp(s2, c);
            c[0] = a[0].powf(b[0]);
        }
        OpCode::Atan2 => {
            // c' = (b a' - a b') / (a² + b²)
            mul(a, a, s1);
            mul(b, b, s2);
            add(s1, s2, s3);
            for k in 1..n {
                // Σ_{j=1}^{k} j (b[k-j] a[j] - a[k-j] b[j]) accumulates k * (numerator series)
                let mut num = F::zero();
                for j in 1..=k {
                    num = num + int::<F>(j) * (b[k - j] * a[j] - a[k - j] * b[j]);
                }
                // Solve s1 * (k c[k]) = num - Σ_{j=1}^{k-1} s1[k-j] j c[j]
                let mut acc = num;
                for j in 1..k {
                    acc = acc - s3[k - j] * int::<F>(j) * c[j];
                }
                c[k] = acc / (s3[0] * int(k));
            }
            c[0] = a[0].atan2(b[0]);
        }
        OpCode::Hypot => {
            mul(a, a, s1);
            mul(b, b, s2);
            add(s1, s2, s3);
            sqrt(s3, c);
            c[0] = a[0].hypot(b[0]);
        }
        OpCode::Max => {
            let src = if a[0] >= b[0] { a } else { b };
            c.copy_from_slice(&src[..n]);
        }
        OpCode::Min => {
            let src = if a[0] <= b[0] { a } else { b };
            c.copy_from_slice(&src[..n]);
        }

        OpCode::Neg => scale(a, -one, c),
        OpCode::Recip => recip(a, c),
        OpCode::Sqrt => sqrt(a, c),
        OpCode::Cbrt => {
            // cbrt(a) = sgn * exp(ln|a| / 3)
            let sgn = a[0].signum();
            scale(a, sgn, s3);
            ln(s3, s1);
            scale(s1, one / (one + one + one), s2);
            exp(s2, c);
            for ck in c.iter_mut() {
                *ck = sgn * *ck;
            }
            c[0] = a[0].cbrt();
        }
        OpCode::Powi => powi(a, exp_i, c, s1, s2, s3),

        OpCode::Exp => exp(a, c),
        OpCode::Exp2 => {
            scale(a, (one + one).ln(), s1);
            exp(s1, c);
            c[0] = a[0].exp2();
        }
        OpCode::ExpM1 => {
            exp(a, c);
            c[0] = a[0].exp_m1();
        }
        OpCode::Ln => ln(a, c),
        OpCode::Log2 | OpCode::Log10 => {
            ln(a, c);
            let base = if op == OpCode::Log2 { one + one } else { int(10) };
            let inv = one / base.ln();
            for ck in c[1..].iter_mut() {
                *ck = *ck * inv;
            }
            c[0] = if op == OpCode::Log2 { a[0].log2() } else { a[0].log10() };
        }
        OpCode::Ln1p => {
            s1.copy_from_slice(&a[..n]);
            s1[0] = one + a[0];
            ln(s1, c);
            c[0] = a[0].ln_1p();
        }

        OpCode::Sin => sin_cos(a, c, s1),
        OpCode::Cos => sin_cos(a, s1, c),
        OpCode::Tan => tan(a, c, s1),
        OpCode::Asin | OpCode::Acos => {
            inverse_factor(a, -one, one, true, s3, s1, s2);
            integrate(a, s3, c);
            if op == OpCode::Acos {
                negate_in_place(c);
                c[0] = a[0].acos();
            } else {
                c[0] = a[0].asin();
            }
        }
        OpCode::Atan => {
            inverse_factor(a, one, one, false, s3, s1, s2);
            integrate(a, s3, c);
            c[0] = a[0].atan();
        }

        OpCode::Sinh => sinh_cosh(a, c, s1),
        OpCode::Cosh => sinh_cosh(a, s1, c),
        OpCode::Tanh => tanh(a, c, s1),
        OpCode::Asinh => {
            inverse_factor(a, one, one, true, s3, s1, s2);
            integrate(a, s3, c);
            c[0] = a[0].asinh();
        }
        OpCode::Acosh => {
            inverse_factor(a, one, -one, true, s3, s1, s2);
            integrate(a, s3, c);
            c[0] = a[0].acosh();
        }
        OpCode::Atanh => {
            inverse_factor(a, -one, one, false, s3, s1, s2);
            integrate(a, s3, c);
            c[0] = a[0].atanh();
        }

        OpCode::Abs => {
            scale(a, a[0].signum(), c);
            c[0] = a[0].abs();
        }
        OpCode::Signum | OpCode::Floor | OpCode::Ceil | OpCode::Round | OpCode::Trunc => {
            constant(crate::opcode::eval_forward(op, a[0], F::zero()), c)
        }
        OpCode::Fract => {
            c.copy_from_slice(&a[..n]);
            c[0] = a[0].fract();
        }

        OpCode::Input
        | OpCode::Compare(_)
        | OpCode::CondExpr(_)
        | OpCode::Load
        | OpCode::Store
        | OpCode::AtomicCall
        | OpCode::AtomicOut => unreachable!("{op:?} is propagated by the sweep itself"),
    }
}

// ══════════════════════════════════════════════
//  Partial-derivative series for the reverse sweep
// ══════════════════════════════════════════════

/// Taylor series of `(∂r/∂a, ∂r/∂b)` along the forward curve, given the
/// operand series `a`, `b` and the result series `r`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn partial_series<F: Float>(
    op: OpCode,
    a: &[F],
    b: &[F],
    r: &[F],
    exp_i: i32,
    da: &mut [F],
    db: &mut [F],
    ws: &mut Workspace<F>,
) {
    let n = da.len();
    let zero = F::zero();
    let one = F::one();
    let (s1, s2, s3) = ws.split(n);
    constant(zero, db);
    match op {
        OpCode::Add => {
            constant(one, da);
            constant(one, db);
        }
        OpCode::Sub => {
            constant(one, da);
            constant(-one, db);
        }
        OpCode::Mul => {
            da.copy_from_slice(&b[..n]);
            db.copy_from_slice(&a[..n]);
        }
        OpCode::Div => {
            recip(b, da);
            div(r, b, db);
            negate_in_place(db);
        }
        OpCode::Rem => {
            constant(one, da);
            constant(-(a[0] / b[0]).trunc(), db);
        }
        OpCode::Powf => {
            // da = b a^(b-1) = b exp((b - 1) ln a), db = r ln a
            ln(a, s1);
            s2.copy_from_slice(&b[..n]);
            s2[0] = s2[0] - one;
            mul(s2, s1, s3);
            exp(s3, s2);
            mul(b, s2, da);
            if r[0] != zero {
                mul(r, s1, db);
            }
        }
        OpCode::Atan2 => {
            mul(a, a, s1);
            mul(b, b, s2);
            add(s1, s2, s3);
            div(b, s3, da);
            div(a, s3, db);
            negate_in_place(db);
        }
        OpCode::Hypot => {
            div(a, r, da);
            div(b, r, db);
        }
        OpCode::Max => {
            let first = a[0] >= b[0];
            constant(if first { one } else { zero }, da);
            constant(if first { zero } else { one }, db);
        }
        OpCode::Min => {
            let first = a[0] <= b[0];
            constant(if first { one } else { zero }, da);
            constant(if first { zero } else { one }, db);
        }

        OpCode::Neg => constant(-one, da),
        OpCode::Recip => {
            mul(r, r, s1);
            scale(s1, -one, da);
        }
        OpCode::Sqrt => {
            recip(r, s1);
            scale(s1, one / (one + one), da);
        }
        OpCode::Cbrt => {
            mul(r, r, s1);
            scale(s1, one + one + one, s2);
            recip(s2, da);
        }
        OpCode::Powi => {
            if exp_i == 0 {
                constant(zero, da);
            } else if let Some(e) = exp_i.checked_sub(1) {
                powi(a, e, s1, s2, s3, da);
                scale(s1, F::from(exp_i).unwrap_or(zero), da);
            } else {
                // a^(n-1) = a^n / a
                powi(a, exp_i, s1, s2, s3, da);
                div(s1, a, s2);
                scale(s2, F::from(exp_i).unwrap_or(zero), da);
            }
        }

        OpCode::Exp => da.copy_from_slice(&r[..n]),
        OpCode::Exp2 => scale(r, (one + one).ln(), da),
        OpCode::ExpM1 => {
            da.copy_from_slice(&r[..n]);
            da[0] = da[0] + one;
        }
        OpCode::Ln => recip(a, da),
        OpCode::Log2 | OpCode::Log10 => {
            recip(a, s1);
            let base = if op == OpCode::Log2 { one + one } else { int(10) };
            scale(s1, one / base.ln(), da);
        }
        OpCode::Ln1p => {
            s1.copy_from_slice(&a[..n]);
            s1[0] = s1[0] + one;
            recip(s1, da);
        }

        OpCode::Sin => sin_cos(a, s1, da),
        OpCode::Cos => {
            sin_cos(a, da, s1);
            negate_in_place(da);
        }
        OpCode::Tan => {
            mul(r, r, da);
            da[0] = da[0] + one;
        }
        OpCode::Asin => inverse_factor(a, -one, one, true, da, s1, s2),
        OpCode::Acos => {
            inverse_factor(a, -one, one, true, da, s1, s2);
            negate_in_place(da);
        }
        OpCode::Atan => inverse_factor(a, one, one, false, da, s1, s2),

        OpCode::Sinh => sinh_cosh(a, s1, da),
        OpCode::Cosh => sinh_cosh(a, da, s1),
        OpCode::Tanh => {
            mul(r, r, s1);
            scale(s1, -one, da);
            da[0] = da[0] + one;
        }
        OpCode::Asinh => inverse_factor(a, one, one, true, da, s1, s2),
        OpCode::Acosh => inverse_factor(a, one, -one, true, da, s1, s2),
        OpCode::Atanh => inverse_factor(a, -one, one, false, da, s1, s2),

        OpCode::Abs => constant(a[0].signum(), da),
        OpCode::Signum | OpCode::Floor | OpCode::Ceil | OpCode::Round | OpCode::Trunc => {
            constant(zero, da)
        }
        OpCode::Fract => constant(one, da),

        OpCode::Input
        | OpCode::Compare(_)
        | OpCode::CondExpr(_)
        | OpCode::Load
        | OpCode::Store
        | OpCode::AtomicCall
        | OpCode::AtomicOut => constant(zero, da),
    }
}
