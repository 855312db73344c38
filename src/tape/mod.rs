//! Operation log and recording sessions.
//!
//! An [`OperationLog`] is the flat record built while a [`Tape`] is active:
//! one node per independent variable followed by one node per operation
//! that touched a variable. Node arguments live in one shared `args` array
//! indexed through `arg_offsets`, so nodes of any arity share the same
//! storage.
//!
//! Constants never become nodes. Operands referring to a constant carry
//! [`CONST_FLAG`](crate::opcode::CONST_FLAG) and index the constant pool.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::atomic::AtomicOp;
use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::{OpCode, Operand, MAX_SLOT};

mod session;
mod thread_local;

pub use self::session::Tape;
pub use self::thread_local::RecorderThreadLocal;
pub(crate) use self::thread_local::{record, record_atomic, recording_id, register_vector, Arg};

static NEXT_TAPE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identifier of a recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TapeId(u32);

impl TapeId {
    pub(crate) fn fresh() -> Self {
        TapeId(NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Location of a variable: the tape that recorded it and its result slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub(crate) tape: TapeId,
    pub(crate) slot: u32,
}

impl NodeRef {
    #[inline]
    pub fn tape(self) -> TapeId {
        self.tape
    }

    /// Slot (node index) within the tape.
    #[inline]
    pub fn slot(self) -> u32 {
        self.slot
    }
}

/// Recorded operations, constants, taped vectors and atomic table of one tape.
#[derive(Clone)]
pub struct OperationLog<F: Float> {
    pub(crate) id: TapeId,
    pub(crate) ops: Vec<OpCode>,
    /// `args[arg_offsets[i]..arg_offsets[i + 1]]` are the arguments of node `i`.
    pub(crate) arg_offsets: Vec<u32>,
    pub(crate) args: Vec<u32>,
    pub(crate) constants: Vec<F>,
    /// Initial contents of each taped vector.
    pub(crate) vectors: Vec<Vec<F>>,
    pub(crate) atomics: Vec<Arc<dyn AtomicOp<F>>>,
    pub(crate) num_independent: u32,
}

impl<F: Float> OperationLog<F> {
    pub(crate) fn new(id: TapeId) -> Self {
        OperationLog {
            id,
            ops: Vec::new(),
            arg_offsets: vec![0],
            args: Vec::new(),
            constants: Vec::new(),
            vectors: Vec::new(),
            atomics: Vec::new(),
            num_independent: 0,
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn num_independent(&self) -> usize {
        self.num_independent as usize
    }

    #[inline]
    pub(crate) fn node_args(&self, i: usize) -> &[u32] {
        &self.args[self.arg_offsets[i] as usize..self.arg_offsets[i + 1] as usize]
    }

    /// Close a node whose arguments were already appended to `args`.
    pub(crate) fn close_node(&mut self, op: OpCode) -> u32 {
        let slot = self.ops.len() as u32;
        assert!(slot <= MAX_SLOT, "operation log exceeds {MAX_SLOT} nodes");
        self.ops.push(op);
        self.arg_offsets.push(self.args.len() as u32);
        slot
    }

    pub(crate) fn push_input(&mut self) -> u32 {
        self.num_independent += 1;
        self.close_node(OpCode::Input)
    }

    /// Add a constant to the pool and return it as an encoded operand.
    pub(crate) fn push_constant(&mut self, value: F) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push(value);
        Operand::Const(idx).encode()
    }

    pub(crate) fn push_vector(&mut self, init: Vec<F>) -> u32 {
        self.vectors.push(init);
        (self.vectors.len() - 1) as u32
    }

    /// Index of `atom` in the atomic table, registering it on first use.
    pub(crate) fn intern_atomic(&mut self, atom: &Arc<dyn AtomicOp<F>>) -> u32 {
        if let Some(i) = self.atomics.iter().position(|a| Arc::ptr_eq(a, atom)) {
            return i as u32;
        }
        self.atomics.push(Arc::clone(atom));
        (self.atomics.len() - 1) as u32
    }

    /// Check that an encoded operand may be read by node `at` (or by a
    /// dependent, with `at = num_nodes`).
    pub(crate) fn check_operand(&self, raw: u32, at: usize) -> Result<()> {
        match Operand::decode(raw) {
            Operand::Const(c) if (c as usize) < self.constants.len() => Ok(()),
            Operand::Const(c) => Err(malformed(format!(
                "constant {c} out of range at node {at} ({} constants)",
                self.constants.len()
            ))),
            Operand::Slot(s) if (s as usize) >= at => Err(malformed(format!(
                "node {at} reads slot {s}, which is not an earlier node"
            ))),
            Operand::Slot(s) => match self.ops[s as usize] {
                OpCode::Store | OpCode::AtomicCall => Err(malformed(format!(
                    "node {at} reads slot {s}, which produces no value"
                ))),
                _ => Ok(()),
            },
        }
    }

    /// Structural validation of a log built outside the recorder (decoded
    /// or deserialized).
    pub(crate) fn validate(&self) -> Result<()> {
        let n = self.ops.len();
        if self.arg_offsets.len() != n + 1
            || self.arg_offsets.first() != Some(&0)
            || self.arg_offsets.last().map(|&o| o as usize) != Some(self.args.len())
            || self.arg_offsets.windows(2).any(|w| w[0] > w[1])
        {
            return Err(malformed("argument offsets are inconsistent".into()));
        }
        let k = self.num_independent as usize;
        if k > n {
            return Err(malformed(format!("{k} independents but only {n} nodes")));
        }

        let mut i = 0;
        while i < n {
            let op = self.ops[i];
            let args = self.node_args(i);
            if (op == OpCode::Input) != (i < k) {
                return Err(malformed(format!(
                    "input nodes must be exactly the first {k} nodes (node {i} is {op:?})"
                )));
            }
            match op.arity() {
                Some(arity) if arity != args.len() => {
                    return Err(malformed(format!(
                        "node {i} ({op:?}) has {} arguments, expected {arity}",
                        args.len()
                    )))
                }
                None if args.len() < 2 => {
                    return Err(malformed(format!("atomic call at node {i} lacks its header")))
                }
                _ => {}
            }
            for &raw in &args[op.operand_range(args.len())] {
                self.check_operand(raw, i)?;
            }
            match op {
                OpCode::Compare(_) if args[2] > 1 => {
                    return Err(malformed(format!("node {i}: recorded outcome must be 0 or 1")))
                }
                OpCode::CondExpr(_) if args[4] > 1 => {
                    return Err(malformed(format!("node {i}: recorded branch must be 0 or 1")))
                }
                OpCode::Load | OpCode::Store if args[0] as usize >= self.vectors.len() => {
                    return Err(malformed(format!(
                        "node {i} references taped vector {} of {}",
                        args[0],
                        self.vectors.len()
                    )))
                }
                OpCode::AtomicCall => {
                    if args[0] as usize >= self.atomics.len() {
                        return Err(malformed(format!(
                            "node {i} references atomic {} of {}",
                            args[0],
                            self.atomics.len()
                        )));
                    }
                    let n_out = args[1] as usize;
                    for out in 0..n_out {
                        let j = i + 1 + out;
                        let ok = j < n
                            && self.ops[j] == OpCode::AtomicOut
                            && self.node_args(j) == [i as u32, out as u32];
                        if !ok {
                            return Err(malformed(format!(
                                "atomic call at node {i} is not followed by its {n_out} outputs"
                            )));
                        }
                    }
                    i += 1 + n_out;
                    continue;
                }
                OpCode::AtomicOut => {
                    return Err(malformed(format!("stray atomic output at node {i}")));
                }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }
}

impl<F: Float> fmt::Debug for OperationLog<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationLog")
            .field("id", &self.id)
            .field("num_independent", &self.num_independent)
            .field("num_nodes", &self.ops.len())
            .field("num_constants", &self.constants.len())
            .field("num_vectors", &self.vectors.len())
            .field(
                "atomics",
                &self.atomics.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn malformed(msg: String) -> AdError {
    AdError::MalformedTape(msg)
}
