use std::marker::PhantomData;

use tracing::debug;

use crate::ad::Ad;
use crate::error::{AdError, Result};
use crate::function::Function;
use crate::opcode::Operand;

use super::thread_local::{self, RecorderThreadLocal};
use super::{NodeRef, OperationLog, TapeId};

/// An active recording on the current thread.
///
/// [`start`](Tape::start) marks the independents and installs a fresh
/// operation log; every operation on their descendants is appended to it.
/// [`stop`](Tape::stop) turns the log into a [`Function`]. Dropping a tape
/// that was never stopped discards the recording.
///
/// At most one tape records per thread at a time. A `Tape` is `!Send`: it
/// must be stopped on the thread that started it.
///
/// ```
/// use adtape::{Ad, Tape};
///
/// let mut x = [Ad::constant(2.0_f64), Ad::constant(3.0)];
/// let tape = Tape::start(&mut x).unwrap();
/// let y = x[0] * x[1] + x[0].sin();
/// let f = tape.stop(&[y]).unwrap();
/// assert_eq!(f.num_independent(), 2);
/// ```
#[derive(Debug)]
pub struct Tape<F: RecorderThreadLocal> {
    id: TapeId,
    num_independent: usize,
    finished: bool,
    _not_send: PhantomData<*const F>,
}

impl<F: RecorderThreadLocal> Tape<F> {
    /// Start recording with `x` as the independent variables.
    ///
    /// Each `x[j]` is replaced by a variable with the same value, bound to
    /// input slot `j`. Fails with [`AdError::NestedRecording`] if this thread
    /// is already recording; `x` is left untouched in that case.
    pub fn start(x: &mut [Ad<F>]) -> Result<Self> {
        let id = TapeId::fresh();
        let mut log: OperationLog<F> = OperationLog::new(id);
        let slots: Vec<u32> = x.iter().map(|_| log.push_input()).collect();
        thread_local::begin(log)?;
        for (xi, slot) in x.iter_mut().zip(slots) {
            *xi = Ad::variable(xi.value(), NodeRef { tape: id, slot });
        }
        debug!(tape = %id, independents = x.len(), "recording started");
        Ok(Tape {
            id,
            num_independent: x.len(),
            finished: false,
            _not_send: PhantomData,
        })
    }

    /// Finish recording with `y` as the dependent variables.
    ///
    /// Dependents that are constants (or variables of a stopped tape) are
    /// stored in the constant pool. On error the recording is discarded.
    pub fn stop(mut self, y: &[Ad<F>]) -> Result<Function<F>> {
        let id = self.id;
        let dependents = thread_local::with_log(|log: &mut OperationLog<F>| {
            y.iter()
                .map(|yi| match yi.node_ref() {
                    Some(node) if node.tape == id => Ok(Operand::Slot(node.slot).encode()),
                    Some(node) if thread_local::is_live_tape(node.tape) => {
                        Err(AdError::InvalidTapeMix {
                            found: node.tape,
                            active: Some(id),
                        })
                    }
                    _ => Ok(log.push_constant(yi.value())),
                })
                .collect::<Result<Vec<u32>>>()
        })
        .ok_or(AdError::NotRecording)??;

        let log = thread_local::finish::<F>().ok_or(AdError::NotRecording)?;
        self.finished = true;
        debug!(
            tape = %id,
            nodes = log.num_nodes(),
            constants = log.constants.len(),
            dependents = dependents.len(),
            "recording stopped"
        );
        Ok(Function::from_parts(log, dependents))
    }

    /// Discard the recording.
    pub fn abort(mut self) {
        self.discard();
    }

    #[inline]
    pub fn id(&self) -> TapeId {
        self.id
    }

    #[inline]
    pub fn num_independent(&self) -> usize {
        self.num_independent
    }

    /// Whether any tape is recording on the current thread.
    pub fn is_recording() -> bool {
        thread_local::active().is_some()
    }

    fn discard(&mut self) {
        if !self.finished {
            self.finished = true;
            if thread_local::finish::<F>().is_some() {
                debug!(tape = %self.id, "recording discarded");
            }
        }
    }
}

impl<F: RecorderThreadLocal> Drop for Tape<F> {
    fn drop(&mut self) {
        self.discard();
    }
}
