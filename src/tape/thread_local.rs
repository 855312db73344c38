use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::LocalKey;

use crate::ad::Ad;
use crate::atomic::AtomicOp;
use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::OpCode;

use super::{NodeRef, OperationLog, TapeId};

thread_local! {
    /// Tape recording on this thread, whatever its float type.
    static ACTIVE: Cell<Option<TapeId>> = const { Cell::new(None) };
    static LOG_F32: RefCell<Option<OperationLog<f32>>> = const { RefCell::new(None) };
    static LOG_F64: RefCell<Option<OperationLog<f64>>> = const { RefCell::new(None) };
}

/// Tapes currently recording on any thread.
static LIVE_TAPES: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

fn live_tapes() -> MutexGuard<'static, BTreeSet<u32>> {
    // The set stays consistent even if a holder panicked.
    LIVE_TAPES.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn is_live_tape(id: TapeId) -> bool {
    live_tapes().contains(&id.get())
}

/// Selects the thread-local operation log for a base float type.
///
/// Implemented for `f32` and `f64`.
pub trait RecorderThreadLocal: Float {
    fn log_cell() -> &'static LocalKey<RefCell<Option<OperationLog<Self>>>>;
}

impl RecorderThreadLocal for f32 {
    fn log_cell() -> &'static LocalKey<RefCell<Option<OperationLog<Self>>>> {
        &LOG_F32
    }
}

impl RecorderThreadLocal for f64 {
    fn log_cell() -> &'static LocalKey<RefCell<Option<OperationLog<Self>>>> {
        &LOG_F64
    }
}

/// Tape recording on the current thread, if any.
pub(crate) fn active() -> Option<TapeId> {
    ACTIVE.with(Cell::get)
}

/// Tape recording `F` operations on the current thread, if any.
pub(crate) fn recording_id<F: RecorderThreadLocal>() -> Option<TapeId> {
    with_log(|log: &mut OperationLog<F>| log.id)
}

/// Install `log` as this thread's recording.
pub(crate) fn begin<F: RecorderThreadLocal>(log: OperationLog<F>) -> Result<()> {
    if let Some(active) = active() {
        return Err(AdError::NestedRecording { active });
    }
    let id = log.id;
    live_tapes().insert(id.get());
    ACTIVE.with(|a| a.set(Some(id)));
    F::log_cell().with(|cell| *cell.borrow_mut() = Some(log));
    Ok(())
}

/// Remove this thread's recording and return its log.
pub(crate) fn finish<F: RecorderThreadLocal>() -> Option<OperationLog<F>> {
    let log = F::log_cell().with(|cell| cell.borrow_mut().take())?;
    ACTIVE.with(|a| a.set(None));
    live_tapes().remove(&log.id.get());
    Some(log)
}

/// Run `f` against this thread's log for `F`, if one is recording.
pub(crate) fn with_log<F: RecorderThreadLocal, R>(
    f: impl FnOnce(&mut OperationLog<F>) -> R,
) -> Option<R> {
    F::log_cell().with(|cell| cell.borrow_mut().as_mut().map(f))
}

/// One argument of a node being recorded.
pub(crate) enum Arg<'a, F: Float> {
    /// A scalar operand, resolved to a slot or a pooled constant.
    Operand(&'a Ad<F>),
    /// Auxiliary data stored verbatim.
    Raw(u32),
    /// A taped vector; makes the node depend on the recording that owns it.
    Vector(TapeId, u32),
}

/// Whether `x` is a variable of the tape recording here (`active`).
///
/// Variables of tapes still recording on other threads cannot be mixed in.
/// Variables of tapes that have stopped are read as constants.
fn is_active_variable<F: Float>(x: &Ad<F>, active: Option<TapeId>) -> Result<bool> {
    match x.node_ref() {
        None => Ok(false),
        Some(node) if Some(node.tape) == active => Ok(true),
        Some(node) if is_live_tape(node.tape) => Err(AdError::InvalidTapeMix {
            found: node.tape,
            active,
        }),
        Some(_) => Ok(false),
    }
}

/// Record one node with result `value`.
///
/// Yields a constant, and records nothing, when no argument is a variable of
/// the active tape.
pub(crate) fn record<F: RecorderThreadLocal>(
    op: OpCode,
    args: &[Arg<'_, F>],
    value: F,
) -> Result<Ad<F>> {
    F::log_cell().with(|cell| {
        let mut slot = cell.borrow_mut();
        let active = slot.as_ref().map(|log| log.id);
        let mut tracked = false;
        for arg in args {
            tracked |= match arg {
                Arg::Operand(x) => is_active_variable(x, active)?,
                Arg::Vector(tape, _) => Some(*tape) == active,
                Arg::Raw(_) => false,
            };
        }
        let log = match slot.as_mut() {
            Some(log) if tracked => log,
            _ => return Ok(Ad::constant(value)),
        };
        for arg in args {
            let raw = match arg {
                Arg::Operand(x) => match x.node_ref() {
                    Some(node) if node.tape == log.id => node.slot,
                    _ => log.push_constant(x.value()),
                },
                Arg::Raw(raw) | Arg::Vector(_, raw) => *raw,
            };
            log.args.push(raw);
        }
        let node = NodeRef {
            tape: log.id,
            slot: log.close_node(op),
        };
        Ok(Ad::variable(value, node))
    })
}

/// Record a call to `atom` whose outputs, already computed, are `outputs`.
pub(crate) fn record_atomic<F: RecorderThreadLocal>(
    atom: &Arc<dyn AtomicOp<F>>,
    inputs: &[Ad<F>],
    outputs: &[F],
) -> Result<Vec<Ad<F>>> {
    F::log_cell().with(|cell| {
        let mut slot = cell.borrow_mut();
        let active = slot.as_ref().map(|log| log.id);
        let mut tracked = false;
        for x in inputs {
            tracked |= is_active_variable(x, active)?;
        }
        let log = match slot.as_mut() {
            Some(log) if tracked => log,
            _ => return Ok(outputs.iter().map(|&v| Ad::constant(v)).collect()),
        };
        let atom_id = log.intern_atomic(atom);
        log.args.push(atom_id);
        log.args.push(outputs.len() as u32);
        for x in inputs {
            let raw = match x.node_ref() {
                Some(node) if node.tape == log.id => node.slot,
                _ => log.push_constant(x.value()),
            };
            log.args.push(raw);
        }
        let call = log.close_node(OpCode::AtomicCall);
        let tape = log.id;
        Ok(outputs
            .iter()
            .enumerate()
            .map(|(k, &v)| {
                log.args.push(call);
                log.args.push(k as u32);
                let slot = log.close_node(OpCode::AtomicOut);
                Ad::variable(v, NodeRef { tape, slot })
            })
            .collect())
    })
}

/// Register a taped vector with the active recording.
pub(crate) fn register_vector<F: RecorderThreadLocal>(init: &[F]) -> Option<(TapeId, u32)> {
    with_log(|log: &mut OperationLog<F>| (log.id, log.push_vector(init.to_vec())))
}
