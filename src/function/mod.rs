//! Frozen operation logs and their sweeps.
//!
//! A [`Function`] is what [`Tape::stop`](crate::Tape::stop) produces: the
//! recorded log plus the dependent operands. It is immutable, `Send + Sync`
//! and can be replayed any number of times. All per-evaluation data lives in
//! a caller-owned [`SweepState`], so concurrent sweeps over one `Function`
//! only need one state each.
//!
//! # Limitations
//!
//! The log records one execution path. Host-language branches on values
//! are baked in; use [`Ad::cond_exp`](crate::Ad::cond_exp) or [`VecAd`](crate::VecAd)
//! for control flow that must survive replay, and watch
//! [`SweepState::compare_change`] to detect replays that left the trace.

use std::fmt;

use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::{OpCode, Operand};
use crate::taylor_ops::Workspace;
use crate::tape::{OperationLog, TapeId};

mod codec;
mod forward;
mod jacobian;
mod reverse;
mod sparsity;

#[cfg(feature = "parallel")]
mod parallel;
#[cfg(feature = "serde")]
mod serde_support;

pub use self::codec::{FORMAT_VERSION, MAGIC};

/// How [`OpCode::CondExpr`] nodes pick a branch during replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BranchPolicy {
    /// Replay the branch taken while recording.
    #[default]
    Recorded,
    /// Re-evaluate the comparison at every order-0 forward sweep.
    Reevaluate,
}

/// Runtime options of a [`Function`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionOptions {
    /// Fail forward sweeps with [`AdError::NanDiagnostic`] when a dependent
    /// is NaN although no independent and no constant is.
    pub check_for_nan: bool,
    pub branch_policy: BranchPolicy,
}

/// A recorded function `y = F(x)`, replayable by forward and reverse sweeps.
#[derive(Clone)]
pub struct Function<F: Float> {
    pub(crate) log: OperationLog<F>,
    /// Encoded operands (slot or constant) of the dependents.
    pub(crate) dependents: Vec<u32>,
    pub(crate) options: FunctionOptions,
}

impl<F: Float> Function<F> {
    pub(crate) fn from_parts(log: OperationLog<F>, dependents: Vec<u32>) -> Self {
        Function {
            log,
            dependents,
            options: FunctionOptions::default(),
        }
    }

    /// Attach runtime options.
    pub fn with_options(mut self, options: FunctionOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn options(&self) -> FunctionOptions {
        self.options
    }

    pub fn set_options(&mut self, options: FunctionOptions) {
        self.options = options;
    }

    /// Id of the recording this function was built from (fresh for decoded
    /// functions).
    #[inline]
    pub fn tape_id(&self) -> TapeId {
        self.log.id
    }

    #[inline]
    pub fn num_independent(&self) -> usize {
        self.log.num_independent()
    }

    #[inline]
    pub fn num_dependent(&self) -> usize {
        self.dependents.len()
    }

    /// Number of nodes, independents included.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.log.num_nodes()
    }

    #[inline]
    pub fn num_constants(&self) -> usize {
        self.log.constants.len()
    }

    /// The recorded operation log.
    #[inline]
    pub fn log(&self) -> &OperationLog<F> {
        &self.log
    }

    /// Opcode of every node, in recording order.
    #[inline]
    pub fn opcodes(&self) -> &[OpCode] {
        &self.log.ops
    }

    /// Decoded dependent operands.
    pub fn dependents(&self) -> impl Iterator<Item = Operand> + '_ {
        self.dependents.iter().map(|&raw| Operand::decode(raw))
    }

    /// Names of the atomic operations this function calls.
    pub fn atomic_names(&self) -> Vec<&str> {
        self.log.atomics.iter().map(|a| a.name()).collect()
    }

    /// A fresh state for sweeps over this function.
    pub fn new_state(&self) -> SweepState<F> {
        let mut state = SweepState::new();
        state.bind(self, 1);
        state
    }

    /// Validate a log and its dependents built outside the recorder.
    pub(crate) fn from_validated(log: OperationLog<F>, dependents: Vec<u32>) -> Result<Self> {
        log.validate()?;
        let n = log.num_nodes();
        for &raw in &dependents {
            log.check_operand(raw, n)?;
        }
        Ok(Function::from_parts(log, dependents))
    }

    /// Coefficient `k` of every dependent.
    pub(crate) fn dependent_coeffs(&self, state: &SweepState<F>, k: usize) -> Vec<F> {
        self.dependents
            .iter()
            .map(|&raw| coeff(&self.log.constants, &state.taylor, state.cap, raw, k))
            .collect()
    }
}

/// Coefficient `k` of an encoded operand.
#[inline]
pub(crate) fn coeff<F: Float>(constants: &[F], taylor: &[F], cap: usize, raw: u32, k: usize) -> F {
    match Operand::decode(raw) {
        Operand::Slot(s) => taylor[s as usize * cap + k],
        Operand::Const(c) if k == 0 => constants[c as usize],
        Operand::Const(_) => F::zero(),
    }
}

/// Coefficients `0..len` of an encoded operand into `out`.
#[inline]
pub(crate) fn fill_series<F: Float>(
    constants: &[F],
    taylor: &[F],
    cap: usize,
    raw: u32,
    len: usize,
    out: &mut Vec<F>,
) {
    out.clear();
    match Operand::decode(raw) {
        Operand::Slot(s) => {
            let base = s as usize * cap;
            out.extend_from_slice(&taylor[base..base + len]);
        }
        Operand::Const(c) => {
            out.resize(len, F::zero());
            if len > 0 {
                out[0] = constants[c as usize];
            }
        }
    }
}

impl<F: Float> fmt::Debug for Function<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("num_independent", &self.num_independent())
            .field("num_dependent", &self.num_dependent())
            .field("num_nodes", &self.num_nodes())
            .field("num_constants", &self.num_constants())
            .field("options", &self.options)
            .finish()
    }
}

/// Where a taped-vector element currently comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ElemSrc<F> {
    Value(F),
    Slot(u32),
}

/// Caller-owned buffers for sweeps over one [`Function`].
///
/// Holds the Taylor coefficients of every node for the orders computed so
/// far, the branch taken at each conditional expression, taped-vector
/// addressing, and the comparison change count of the last order-0 sweep.
/// Reusing a state across calls avoids reallocation; binding it to another
/// function resets it.
#[derive(Clone, Debug)]
pub struct SweepState<F: Float> {
    owner: Option<TapeId>,
    /// `taylor[slot * cap + k]`
    pub(crate) taylor: Vec<F>,
    pub(crate) cap: usize,
    pub(crate) slots: usize,
    /// Orders `0..orders` are valid.
    pub(crate) orders: usize,
    /// Branch taken by each `CondExpr` node (indexed by slot).
    pub(crate) branches: Vec<bool>,
    /// Element a `Load` node read (indexed by slot).
    pub(crate) load_src: Vec<Option<ElemSrc<F>>>,
    pub(crate) vectors: Vec<Vec<ElemSrc<F>>>,
    pub(crate) compare_change: usize,
    pub(crate) ws: Workspace<F>,
    pub(crate) scratch: Scratch<F>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Scratch<F> {
    pub(crate) a: Vec<F>,
    pub(crate) b: Vec<F>,
    pub(crate) c: Vec<F>,
    pub(crate) d: Vec<F>,
    pub(crate) adj: Vec<F>,
    pub(crate) tx: Vec<F>,
    pub(crate) ty: Vec<F>,
    pub(crate) px: Vec<F>,
    pub(crate) py: Vec<F>,
}

impl<F: Float> Default for SweepState<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> SweepState<F> {
    /// An empty state; binds to a function on first use.
    pub fn new() -> Self {
        SweepState {
            owner: None,
            taylor: Vec::new(),
            cap: 0,
            slots: 0,
            orders: 0,
            branches: Vec::new(),
            load_src: Vec::new(),
            vectors: Vec::new(),
            compare_change: 0,
            ws: Workspace::new(),
            scratch: Scratch::default(),
        }
    }

    /// Number of Taylor orders currently valid (`0` before any forward sweep).
    #[inline]
    pub fn orders(&self) -> usize {
        self.orders
    }

    /// Comparisons whose outcome differed from the recording in the last
    /// order-0 forward sweep.
    #[inline]
    pub fn compare_change(&self) -> usize {
        self.compare_change
    }

    /// Coefficient `k` of every node (debugging aid).
    pub fn coefficients(&self, k: usize) -> Option<Vec<F>> {
        (k < self.orders).then(|| {
            (0..self.slots)
                .map(|s| self.taylor[s * self.cap + k])
                .collect()
        })
    }

    /// Make room for `orders` coefficients per slot of `f`, resetting if
    /// the state belonged to another function.
    pub(crate) fn bind(&mut self, f: &Function<F>, orders: usize) {
        let slots = f.num_nodes();
        if self.owner != Some(f.log.id) || self.slots != slots {
            self.owner = Some(f.log.id);
            self.slots = slots;
            self.cap = orders.max(1);
            self.orders = 0;
            self.taylor.clear();
            self.taylor.resize(slots * self.cap, F::zero());
            self.branches.clear();
            self.branches.resize(slots, false);
            self.load_src.clear();
            self.load_src.resize(slots, None);
            self.vectors.clear();
            self.compare_change = 0;
        } else if orders > self.cap {
            let new_cap = orders.max(self.cap * 2);
            let mut grown = vec![F::zero(); slots * new_cap];
            for s in 0..slots {
                let keep = self.orders.min(self.cap);
                grown[s * new_cap..s * new_cap + keep]
                    .copy_from_slice(&self.taylor[s * self.cap..s * self.cap + keep]);
            }
            self.taylor = grown;
            self.cap = new_cap;
        }
    }
}

pub(crate) fn shape_error(context: &'static str, expected: usize, found: usize) -> AdError {
    AdError::ShapeMismatch {
        context,
        expected,
        found,
    }
}
