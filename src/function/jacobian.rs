use crate::error::Result;
use crate::float::Float;

use super::{shape_error, Function};

impl<F: Float> Function<F> {
    fn require_scalar(&self, context: &'static str) -> Result<()> {
        match self.num_dependent() {
            1 => Ok(()),
            m => Err(shape_error(context, 1, m)),
        }
    }

    /// Gradient of a scalar function at `x`: one forward and one reverse sweep.
    pub fn gradient(&self, x: &[F]) -> Result<Vec<F>> {
        self.require_scalar("gradient: dependents")?;
        let mut state = self.new_state();
        self.forward(&mut state, 0, x)?;
        self.reverse(&mut state, 1, &[F::one()])
    }

    /// Value and vector-Jacobian product `wᵀJ` at `x`.
    pub fn vjp(&self, x: &[F], w: &[F]) -> Result<(Vec<F>, Vec<F>)> {
        let mut state = self.new_state();
        let y = self.forward(&mut state, 0, x)?;
        let g = self.reverse(&mut state, 1, w)?;
        Ok((y, g))
    }

    /// Value and Jacobian-vector product `J·v` at `x`.
    pub fn jvp(&self, x: &[F], v: &[F]) -> Result<(Vec<F>, Vec<F>)> {
        let mut state = self.new_state();
        let y = self.forward(&mut state, 0, x)?;
        let dy = self.forward(&mut state, 1, v)?;
        Ok((y, dy))
    }

    /// Jacobian `J[i][j] = ∂y_i/∂x_j`, one reverse sweep per dependent.
    pub fn jacobian(&self, x: &[F]) -> Result<Vec<Vec<F>>> {
        let m = self.num_dependent();
        let mut state = self.new_state();
        self.forward(&mut state, 0, x)?;
        let mut w = vec![F::zero(); m];
        let mut jac = Vec::with_capacity(m);
        for i in 0..m {
            w[i] = F::one();
            jac.push(self.reverse(&mut state, 1, &w)?);
            w[i] = F::zero();
        }
        Ok(jac)
    }

    /// Jacobian by forward sweeps, one per independent. Cheaper than
    /// [`jacobian`](Self::jacobian) when there are fewer inputs than outputs.
    pub fn jacobian_forward(&self, x: &[F]) -> Result<Vec<Vec<F>>> {
        let n = self.num_independent();
        let m = self.num_dependent();
        let mut state = self.new_state();
        self.forward(&mut state, 0, x)?;
        let mut jac = vec![vec![F::zero(); n]; m];
        let mut v = vec![F::zero(); n];
        for j in 0..n {
            v[j] = F::one();
            let col = self.forward(&mut state, 1, &v)?;
            for (row, dy) in jac.iter_mut().zip(col) {
                row[j] = dy;
            }
            v[j] = F::zero();
        }
        Ok(jac)
    }

    /// Gradient and Hessian-vector product `H·v` of a scalar function.
    pub fn hvp(&self, x: &[F], v: &[F]) -> Result<(Vec<F>, Vec<F>)> {
        self.require_scalar("hvp: dependents")?;
        let mut state = self.new_state();
        self.forward(&mut state, 0, x)?;
        self.forward(&mut state, 1, v)?;
        let dw = self.reverse(&mut state, 2, &[F::one()])?;
        let n = self.num_independent();
        let grad = (0..n).map(|j| dw[j * 2 + 1]).collect();
        let hv = (0..n).map(|j| dw[j * 2]).collect();
        Ok((grad, hv))
    }

    /// Hessian of a scalar function: one order-1 forward and one order-2
    /// reverse sweep per independent.
    pub fn hessian(&self, x: &[F]) -> Result<Vec<Vec<F>>> {
        self.require_scalar("hessian: dependents")?;
        let n = self.num_independent();
        let mut state = self.new_state();
        self.forward(&mut state, 0, x)?;
        let mut hess = vec![vec![F::zero(); n]; n];
        let mut v = vec![F::zero(); n];
        for j in 0..n {
            v[j] = F::one();
            self.forward(&mut state, 1, &v)?;
            let dw = self.reverse(&mut state, 2, &[F::one()])?;
            for (i, row) in hess.iter_mut().enumerate() {
                row[j] = dw[i * 2];
            }
            v[j] = F::zero();
        }
        Ok(hess)
    }
}
