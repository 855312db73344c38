use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::{self, OpCode, Operand};
use crate::taylor_ops;

use super::{coeff, fill_series, shape_error, ElemSrc, Function, SweepState};

impl<F: Float> Function<F> {
    /// Reverse sweep of order `q` over the base point in `state`.
    ///
    /// `w` weights the dependents' Taylor coefficients: with `m * q` entries
    /// `w[i * q + k]` weights coefficient `k` of dependent `i`; with `m`
    /// entries the weights apply to coefficient `q - 1`. Returns `n * q`
    /// values `dw[j * q + k] = ∂W/∂x_j^(k)`, where `W = Σ w_ik y_i^(k)`.
    ///
    /// `q = 1` after an order-0 forward gives `wᵀJ`. `q = 2` after an
    /// order-1 forward in direction `v`, with `w = [1]` on a scalar
    /// function, gives the gradient in `dw[j * 2 + 1]` and the
    /// Hessian-vector product `(H·v)_j` in `dw[j * 2]`.
    pub fn reverse(&self, state: &mut SweepState<F>, q: usize, w: &[F]) -> Result<Vec<F>> {
        if q == 0 {
            return Err(AdError::InvalidOrder { order: q });
        }
        state.bind(self, q);
        if state.orders < q {
            return Err(AdError::NoBasePoint {
                required: q,
                available: state.orders,
            });
        }
        let m = self.num_dependent();
        let dense = if w.len() == m * q {
            true
        } else if w.len() == m {
            false
        } else {
            return Err(shape_error("reverse: w", m * q, w.len()));
        };

        let slots = self.num_nodes();
        let mut adj = std::mem::take(&mut state.scratch.adj);
        adj.clear();
        adj.resize(slots * q, F::zero());

        // Seed series: S_i[a] = w_{i, q-1-a}.
        for (i, &raw) in self.dependents.iter().enumerate() {
            if let Operand::Slot(s) = Operand::decode(raw) {
                let base = s as usize * q;
                if dense {
                    for a in 0..q {
                        adj[base + a] = adj[base + a] + w[i * q + (q - 1 - a)];
                    }
                } else {
                    adj[base] = adj[base] + w[i];
                }
            }
        }

        let result = if q == 1 {
            self.reverse_first(state, &mut adj)
        } else {
            self.reverse_series(state, q, &mut adj)
        };
        let out = result.map(|()| {
            let n = self.num_independent();
            let mut dw = vec![F::zero(); n * q];
            for j in 0..n {
                for l in 0..q {
                    dw[j * q + l] = adj[j * q + (q - 1 - l)];
                }
            }
            dw
        });
        state.scratch.adj = adj;
        out
    }

    /// First-order adjoints with scalar partials.
    fn reverse_first(&self, state: &mut SweepState<F>, adj: &mut [F]) -> Result<()> {
        let log = &self.log;
        let consts = &log.constants[..];
        let cap = state.cap;
        let zero = F::zero();

        for i in (log.num_independent()..log.num_nodes()).rev() {
            let ai = adj[i];
            let op = log.ops[i];
            if ai == zero && op != OpCode::AtomicCall {
                continue;
            }
            let args = log.node_args(i);
            match op {
                OpCode::Input
                | OpCode::AtomicOut
                | OpCode::Compare(_)
                | OpCode::Store => {}
                OpCode::CondExpr(_) => {
                    let pick = if state.branches[i] { 2 } else { 3 };
                    accumulate(adj, args[pick], ai);
                }
                OpCode::Load => {
                    if let Some(ElemSrc::Slot(s)) = state.load_src[i] {
                        adj[s as usize] = adj[s as usize] + ai;
                    }
                }
                OpCode::AtomicCall => self.atomic_reverse(state, i, 1, adj)?,
                op => {
                    let taylor = &state.taylor[..];
                    let a = coeff(consts, taylor, cap, args[0], 0);
                    let b = match op {
                        OpCode::Powi => F::from(opcode::powi_exp_decode(args[1])).unwrap_or(zero),
                        op if op.is_binary() => coeff(consts, taylor, cap, args[1], 0),
                        _ => zero,
                    };
                    let r = taylor[i * cap];
                    let (da, db) = opcode::reverse_partials(op, a, b, r);
                    accumulate(adj, args[0], da * ai);
                    if op.is_binary() {
                        accumulate(adj, args[1], db * ai);
                    }
                }
            }
        }
        Ok(())
    }

    /// Adjoint series over `q` coefficients (forward-over-reverse).
    fn reverse_series(&self, state: &mut SweepState<F>, q: usize, adj: &mut [F]) -> Result<()> {
        let log = &self.log;
        let consts = &log.constants[..];
        let cap = state.cap;
        let zero = F::zero();

        for i in (log.num_independent()..log.num_nodes()).rev() {
            let op = log.ops[i];
            let row = i * q;
            if op != OpCode::AtomicCall && adj[row..row + q].iter().all(|&v| v == zero) {
                continue;
            }
            let args = log.node_args(i);
            match op {
                OpCode::Input
                | OpCode::AtomicOut
                | OpCode::Compare(_)
                | OpCode::Store => {}
                OpCode::CondExpr(_) => {
                    let pick = if state.branches[i] { 2 } else { 3 };
                    if let Operand::Slot(s) = Operand::decode(args[pick]) {
                        add_rows(adj, s as usize * q, row, q);
                    }
                }
                OpCode::Load => {
                    if let Some(ElemSrc::Slot(s)) = state.load_src[i] {
                        add_rows(adj, s as usize * q, row, q);
                    }
                }
                OpCode::AtomicCall => self.atomic_reverse(state, i, q, adj)?,
                op => {
                    let SweepState {
                        taylor,
                        ws,
                        scratch,
                        ..
                    } = &mut *state;
                    fill_series(consts, taylor, cap, args[0], q, &mut scratch.a);
                    let exp = match op {
                        OpCode::Powi => opcode::powi_exp_decode(args[1]),
                        _ => 0,
                    };
                    if op.is_binary() {
                        fill_series(consts, taylor, cap, args[1], q, &mut scratch.b);
                    } else {
                        scratch.b.clear();
                        scratch.b.resize(q, zero);
                    }
                    scratch.px.clear();
                    scratch.px.extend_from_slice(&taylor[i * cap..i * cap + q]);
                    scratch.c.clear();
                    scratch.c.resize(q, zero);
                    scratch.d.clear();
                    scratch.d.resize(q, zero);
                    taylor_ops::partial_series(
                        op,
                        &scratch.a,
                        &scratch.b,
                        &scratch.px,
                        exp,
                        &mut scratch.c,
                        &mut scratch.d,
                        ws,
                    );

                    scratch.py.clear();
                    scratch.py.extend_from_slice(&adj[row..row + q]);
                    if let Operand::Slot(s) = Operand::decode(args[0]) {
                        let base = s as usize * q;
                        taylor_ops::mul_acc(&scratch.py, &scratch.c, &mut adj[base..base + q]);
                    }
                    if op.is_binary() {
                        if let Operand::Slot(s) = Operand::decode(args[1]) {
                            let base = s as usize * q;
                            taylor_ops::mul_acc(&scratch.py, &scratch.d, &mut adj[base..base + q]);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Push output adjoints of the atomic call at node `i` to its inputs.
    fn atomic_reverse(
        &self,
        state: &mut SweepState<F>,
        i: usize,
        q: usize,
        adj: &mut [F],
    ) -> Result<()> {
        let log = &self.log;
        let args = log.node_args(i);
        let atom = &log.atomics[args[0] as usize];
        let n_out = args[1] as usize;
        let inputs = &args[2..];
        let cap = state.cap;
        let scratch = &mut state.scratch;

        let out_rows = (i + 1) * q..(i + 1 + n_out) * q;
        if adj[out_rows.clone()].iter().all(|&v| v == F::zero()) {
            return Ok(());
        }
        scratch.py.clear();
        scratch.py.extend_from_slice(&adj[out_rows]);
        scratch.tx.clear();
        for &raw in inputs {
            for l in 0..q {
                scratch
                    .tx
                    .push(coeff(&log.constants, &state.taylor, cap, raw, l));
            }
        }
        scratch.ty.clear();
        for out in 0..n_out {
            let base = (i + 1 + out) * cap;
            scratch.ty.extend_from_slice(&state.taylor[base..base + q]);
        }
        scratch.px.clear();
        scratch.px.resize(inputs.len() * q, F::zero());
        if !atom.reverse(q, &scratch.tx, &scratch.ty, &mut scratch.px, &scratch.py) {
            return Err(AdError::AtomicFailed {
                name: atom.name().to_owned(),
                order: q,
            });
        }
        for (j, &raw) in inputs.iter().enumerate() {
            if let Operand::Slot(s) = Operand::decode(raw) {
                let base = s as usize * q;
                for l in 0..q {
                    adj[base + l] = adj[base + l] + scratch.px[j * q + l];
                }
            }
        }
        Ok(())
    }
}

#[inline]
fn accumulate<F: Float>(adj: &mut [F], raw: u32, v: F) {
    if let Operand::Slot(s) = Operand::decode(raw) {
        adj[s as usize] = adj[s as usize] + v;
    }
}

/// `adj[dst..dst + q] += adj[src..src + q]` for `dst < src`.
#[inline]
fn add_rows<F: Float>(adj: &mut [F], dst: usize, src: usize, q: usize) {
    let (lo, hi) = adj.split_at_mut(src);
    for l in 0..q {
        lo[dst + l] = lo[dst + l] + hi[l];
    }
}
