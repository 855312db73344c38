//! Taped vectors: arrays indexed by a recorded value.
//!
//! A host `Vec<Ad<F>>` indexed by `x.value() as usize` bakes the index seen
//! at record time into the tape. [`VecAd`] records loads and stores with the
//! index as an operand, so a replay at other inputs reads and writes the
//! element the new index selects.

use crate::ad::Ad;
use crate::error::{AdError, Result};
use crate::float::Float;
use crate::opcode::OpCode;
use crate::tape::{record, register_vector, recording_id, Arg, RecorderThreadLocal, TapeId};

/// Position addressed by `index` (truncated toward zero) in a vector of `len`.
pub(crate) fn element_position<F: Float>(index: F, len: usize) -> Result<usize> {
    let raw = index.to_i64();
    match raw {
        Some(i) if i >= 0 && (i as usize) < len => Ok(i as usize),
        _ => Err(AdError::IndexOutOfRange {
            index: raw.unwrap_or(i64::MIN),
            len,
        }),
    }
}

/// A vector whose element accesses are recorded.
///
/// Created while a tape records, its initial contents become part of the
/// tape. Created outside a recording, it behaves like a plain vector.
/// Derivatives flow through stored values; the index itself has zero
/// derivative.
#[derive(Clone, Debug)]
pub struct VecAd<F: Float> {
    data: Vec<Ad<F>>,
    taped: Option<(TapeId, u32)>,
}

impl<F: RecorderThreadLocal> VecAd<F> {
    pub fn new(init: &[F]) -> Self {
        VecAd {
            data: init.iter().map(|&v| Ad::constant(v)).collect(),
            taped: register_vector(init),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn position(&self, index: &Ad<F>) -> Result<usize> {
        element_position(index.value(), self.data.len())
    }

    /// The taped id, if this vector belongs to the recording active here.
    fn recording(&self) -> Option<(TapeId, u32)> {
        self.taped
            .filter(|&(tape, _)| recording_id::<F>() == Some(tape))
    }

    /// Element at `index` (truncated toward zero).
    pub fn load(&self, index: Ad<F>) -> Result<Ad<F>> {
        let pos = self.position(&index)?;
        let elem = self.data[pos];
        match self.recording() {
            Some((tape, vid)) => record(
                OpCode::Load,
                &[Arg::Vector(tape, vid), Arg::Operand(&index)],
                elem.value(),
            ),
            None => Ok(elem),
        }
    }

    /// Replace the element at `index` (truncated toward zero).
    pub fn store(&mut self, index: Ad<F>, value: Ad<F>) -> Result<()> {
        let pos = self.position(&index)?;
        if let Some((tape, vid)) = self.recording() {
            record(
                OpCode::Store,
                &[
                    Arg::Vector(tape, vid),
                    Arg::Operand(&index),
                    Arg::Operand(&value),
                ],
                F::zero(),
            )?;
        }
        self.data[pos] = value;
        Ok(())
    }
}
