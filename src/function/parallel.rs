use rayon::prelude::*;

use crate::error::Result;
use crate::float::Float;

use super::Function;

impl<F: Float> Function<F> {
    /// Evaluate at many points in parallel, one [`SweepState`](super::SweepState)
    /// per worker.
    pub fn forward_batch(&self, xs: &[Vec<F>]) -> Result<Vec<Vec<F>>> {
        xs.par_iter()
            .map_init(
                || self.new_state(),
                |state, x| self.forward(state, 0, x),
            )
            .collect()
    }

    /// Gradients of a scalar function at many points in parallel.
    pub fn gradient_batch(&self, xs: &[Vec<F>]) -> Result<Vec<Vec<F>>> {
        xs.par_iter()
            .map_init(
                || self.new_state(),
                |state, x| {
                    self.forward(state, 0, x)?;
                    self.reverse(state, 1, &[F::one()])
                },
            )
            .collect()
    }
}
