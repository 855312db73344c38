use tracing::{debug, warn};

use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::{self, OpCode, Operand};
use crate::taylor_ops;
use crate::vec_ad::element_position;

use super::{coeff, fill_series, shape_error, BranchPolicy, ElemSrc, Function, SweepState};

impl<F: Float> Function<F> {
    /// Forward sweep.
    ///
    /// With `xq.len() == n`, `xq` is Taylor coefficient `q` of the
    /// independents and only order `q` is computed; orders `0..q` must
    /// already be in `state`. Returns coefficient `q` of each dependent.
    ///
    /// With `xq.len() == n * (q + 1)`, `xq[j * (q + 1) + k]` is coefficient
    /// `k` of independent `j` and orders `0..=q` are computed. Returns
    /// `y[i * (q + 1) + k]`.
    ///
    /// Order 0 evaluates the function itself; order 1 with `x¹ = v` gives
    /// the directional derivative `J·v`.
    pub fn forward(&self, state: &mut SweepState<F>, q: usize, xq: &[F]) -> Result<Vec<F>> {
        let n = self.num_independent();
        if xq.len() == n {
            state.bind(self, q + 1);
            if state.orders < q {
                return Err(AdError::NoBasePoint {
                    required: q,
                    available: state.orders,
                });
            }
            state.orders = q;
            for (j, &v) in xq.iter().enumerate() {
                state.taylor[j * state.cap + q] = v;
            }
            self.sweep_order(state, q)?;
            state.orders = q + 1;
            self.check_nan(state, q)?;
            Ok(self.dependent_coeffs(state, q))
        } else if xq.len() == n * (q + 1) {
            state.bind(self, q + 1);
            state.orders = 0;
            for k in 0..=q {
                for j in 0..n {
                    state.taylor[j * state.cap + k] = xq[j * (q + 1) + k];
                }
                self.sweep_order(state, k)?;
                state.orders = k + 1;
                self.check_nan(state, k)?;
            }
            let mut y = Vec::with_capacity(self.num_dependent() * (q + 1));
            for &raw in &self.dependents {
                for k in 0..=q {
                    y.push(coeff(&self.log.constants, &state.taylor, state.cap, raw, k));
                }
            }
            Ok(y)
        } else {
            Err(shape_error("forward: xq", n * (q + 1), xq.len()))
        }
    }

    /// Evaluate the function at `x` (order-0 sweep in a fresh state).
    pub fn evaluate(&self, x: &[F]) -> Result<Vec<F>> {
        let mut state = self.new_state();
        self.forward(&mut state, 0, x)
    }

    fn sweep_order(&self, state: &mut SweepState<F>, k: usize) -> Result<()> {
        if k == 0 {
            self.sweep_values(state)?;
            if state.compare_change > 0 {
                debug!(
                    changed = state.compare_change,
                    "forward sweep left the recorded comparison outcomes"
                );
            }
            Ok(())
        } else {
            self.sweep_coefficients(state, k)
        }
    }

    /// Order 0, with the same scalar kernels the recorder uses.
    fn sweep_values(&self, state: &mut SweepState<F>) -> Result<()> {
        let log = &self.log;
        let consts = &log.constants[..];
        let zero = F::zero();
        let one = F::one();

        state.compare_change = 0;
        state.vectors.clear();
        state.vectors.extend(
            log.vectors
                .iter()
                .map(|v| v.iter().map(|&x| ElemSrc::Value(x)).collect::<Vec<_>>()),
        );

        for i in log.num_independent()..log.num_nodes() {
            let args = log.node_args(i);
            let cap = state.cap;
            let taylor = &state.taylor[..];
            let value = match log.ops[i] {
                OpCode::Input | OpCode::AtomicOut => continue,
                OpCode::AtomicCall => {
                    self.atomic_forward(state, i, 0)?;
                    continue;
                }
                OpCode::Compare(cmp) => {
                    let l = coeff(consts, taylor, cap, args[0], 0);
                    let r = coeff(consts, taylor, cap, args[1], 0);
                    let holds = cmp.eval(l, r);
                    if holds != (args[2] == 1) {
                        state.compare_change += 1;
                    }
                    if holds {
                        one
                    } else {
                        zero
                    }
                }
                OpCode::CondExpr(cmp) => {
                    let taken = match self.options.branch_policy {
                        BranchPolicy::Recorded => args[4] == 1,
                        BranchPolicy::Reevaluate => cmp.eval(
                            coeff(consts, taylor, cap, args[0], 0),
                            coeff(consts, taylor, cap, args[1], 0),
                        ),
                    };
                    let v = coeff(consts, taylor, cap, args[if taken { 2 } else { 3 }], 0);
                    state.branches[i] = taken;
                    v
                }
                OpCode::Load => {
                    let elems = &state.vectors[args[0] as usize];
                    let pos = element_position(coeff(consts, taylor, cap, args[1], 0), elems.len())?;
                    let src = elems[pos];
                    let v = match src {
                        ElemSrc::Value(v) => v,
                        ElemSrc::Slot(s) => taylor[s as usize * cap],
                    };
                    state.load_src[i] = Some(src);
                    v
                }
                OpCode::Store => {
                    let elems = &mut state.vectors[args[0] as usize];
                    let pos = element_position(coeff(consts, taylor, cap, args[1], 0), elems.len())?;
                    elems[pos] = match Operand::decode(args[2]) {
                        Operand::Slot(s) => ElemSrc::Slot(s),
                        Operand::Const(c) => ElemSrc::Value(consts[c as usize]),
                    };
                    zero
                }
                OpCode::Powi => {
                    let a = coeff(consts, taylor, cap, args[0], 0);
                    let exp = F::from(opcode::powi_exp_decode(args[1])).unwrap_or(zero);
                    opcode::eval_forward(OpCode::Powi, a, exp)
                }
                op if op.is_binary() => opcode::eval_forward(
                    op,
                    coeff(consts, taylor, cap, args[0], 0),
                    coeff(consts, taylor, cap, args[1], 0),
                ),
                op => opcode::eval_forward(op, coeff(consts, taylor, cap, args[0], 0), zero),
            };
            state.taylor[i * cap] = value;
        }
        Ok(())
    }

    /// Order `k >= 1`; orders `0..k` are in `state`.
    fn sweep_coefficients(&self, state: &mut SweepState<F>, k: usize) -> Result<()> {
        let log = &self.log;
        let consts = &log.constants[..];
        let len = k + 1;

        for i in log.num_independent()..log.num_nodes() {
            let args = log.node_args(i);
            let cap = state.cap;
            let ck = match log.ops[i] {
                OpCode::Input | OpCode::AtomicOut => continue,
                OpCode::AtomicCall => {
                    self.atomic_forward(state, i, k)?;
                    continue;
                }
                // Piecewise constant in the operands.
                OpCode::Compare(_) | OpCode::Store => F::zero(),
                OpCode::CondExpr(_) => {
                    let pick = if state.branches[i] { 2 } else { 3 };
                    coeff(consts, &state.taylor, cap, args[pick], k)
                }
                OpCode::Load => match state.load_src[i] {
                    Some(ElemSrc::Slot(s)) => state.taylor[s as usize * cap + k],
                    _ => F::zero(),
                },
                op => {
                    let SweepState {
                        taylor,
                        ws,
                        scratch,
                        ..
                    } = &mut *state;
                    fill_series(consts, taylor, cap, args[0], len, &mut scratch.a);
                    let exp = match op {
                        OpCode::Powi => opcode::powi_exp_decode(args[1]),
                        _ => 0,
                    };
                    if op.is_binary() {
                        fill_series(consts, taylor, cap, args[1], len, &mut scratch.b);
                    } else {
                        scratch.b.clear();
                        scratch.b.resize(len, F::zero());
                    }
                    scratch.c.clear();
                    scratch.c.resize(len, F::zero());
                    taylor_ops::eval_series(op, &scratch.a, &scratch.b, exp, &mut scratch.c, ws);
                    scratch.c[k]
                }
            };
            state.taylor[i * cap + k] = ck;
        }
        Ok(())
    }

    /// Order `k` of an atomic call at node `i`; its outputs follow in `i + 1..`.
    pub(crate) fn atomic_forward(&self, state: &mut SweepState<F>, i: usize, k: usize) -> Result<()> {
        let log = &self.log;
        let args = log.node_args(i);
        let atom = &log.atomics[args[0] as usize];
        let n_out = args[1] as usize;
        let len = k + 1;
        let cap = state.cap;

        let SweepState {
            taylor, scratch, ..
        } = &mut *state;
        scratch.tx.clear();
        for &raw in &args[2..] {
            for l in 0..len {
                scratch.tx.push(coeff(&log.constants, taylor, cap, raw, l));
            }
        }
        scratch.ty.clear();
        scratch.ty.resize(n_out * len, F::zero());
        for out in 0..n_out {
            let slot = i + 1 + out;
            scratch.ty[out * len..out * len + k].copy_from_slice(&taylor[slot * cap..slot * cap + k]);
        }
        if !atom.forward(k, k, &scratch.tx, &mut scratch.ty) {
            return Err(AdError::AtomicFailed {
                name: atom.name().to_owned(),
                order: k,
            });
        }
        for out in 0..n_out {
            taylor[(i + 1 + out) * cap + k] = scratch.ty[out * len + k];
        }
        Ok(())
    }

    /// Leaves are the order-0 independents in `state`, the constants and
    /// the taped-vector contents.
    fn check_nan(&self, state: &SweepState<F>, k: usize) -> Result<()> {
        if !self.options.check_for_nan
            || (0..self.num_independent()).any(|j| state.taylor[j * state.cap].is_nan())
            || self.log.constants.iter().any(|c| c.is_nan())
            || self.log.vectors.iter().flatten().any(|v| v.is_nan())
        {
            return Ok(());
        }
        for (i, &raw) in self.dependents.iter().enumerate() {
            if coeff(&self.log.constants, &state.taylor, state.cap, raw, k).is_nan() {
                warn!(dependent = i, order = k, "NaN in dependent with NaN-free inputs");
                return Err(AdError::NanDiagnostic {
                    dependent: i,
                    order: k,
                });
            }
        }
        Ok(())
    }
}
