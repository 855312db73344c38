//! User-defined atomic operations.
//!
//! An atomic operation is a vector function `y = g(x)` that the tape stores
//! as a single call instead of its elementary operations. The sweeps hand
//! the call's Taylor coefficients to the user's callbacks.
//!
//! # Coefficient layout
//!
//! With `p + 1` coefficients per variable, `tx[j * (p + 1) + k]` is
//! coefficient `k` of input `j` and `ty[i * (p + 1) + k]` coefficient `k` of
//! output `i`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use adtape::{Ad, AtomicOp, Atomic, Tape};
//!
//! /// y = x0 * x1, first order only.
//! struct Product;
//!
//! impl AtomicOp<f64> for Product {
//!     fn name(&self) -> &str {
//!         "product"
//!     }
//!     fn forward(&self, _lo: usize, up: usize, tx: &[f64], ty: &mut [f64]) -> bool {
//!         if up > 0 {
//!             return false;
//!         }
//!         ty[0] = tx[0] * tx[1];
//!         true
//!     }
//!     fn reverse(&self, q: usize, tx: &[f64], _ty: &[f64], px: &mut [f64], py: &[f64]) -> bool {
//!         if q > 1 {
//!             return false;
//!         }
//!         px[0] = py[0] * tx[1];
//!         px[1] = py[0] * tx[0];
//!         true
//!     }
//! }
//!
//! let product = Atomic::new(Product);
//! let mut x = [Ad::constant(3.0), Ad::constant(4.0)];
//! let tape = Tape::start(&mut x).unwrap();
//! let y = product.call(&x, 1).unwrap();
//! let f = tape.stop(&y).unwrap();
//! assert_eq!(f.gradient(&[2.0, 5.0]).unwrap(), vec![5.0, 2.0]);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::ad::Ad;
use crate::error::{AdError, Result};
use crate::float::Float;
use crate::tape::{record_atomic, RecorderThreadLocal};

/// Callbacks of an atomic operation.
///
/// Callbacks return `false` when they cannot handle a request (for example
/// an order they do not implement); the sweep then fails with
/// [`AdError::AtomicFailed`].
pub trait AtomicOp<F: Float>: Send + Sync {
    /// Name stored in serialized tapes; decoding looks the operation up by it.
    fn name(&self) -> &str;

    /// Taylor forward: fill orders `order_low..=order_up` of `ty` from the
    /// input coefficients `tx`. Lower orders of `ty` are already set.
    fn forward(&self, order_low: usize, order_up: usize, tx: &[F], ty: &mut [F]) -> bool;

    /// Adjoint series: `px_j = Σ_i py_i · ∂y_i/∂x_j`, each factor a series
    /// in `t` truncated to `q` coefficients.
    ///
    /// `tx` and `ty` hold `q` coefficients per variable (orders `0..q`), as
    /// do `py` and `px`. `px` arrives zeroed. With `q == 1` this is the plain
    /// vector-Jacobian product at the base point.
    fn reverse(&self, q: usize, tx: &[F], ty: &[F], px: &mut [F], py: &[F]) -> bool;

    /// Forward Jacobian sparsity: given the dependency set of each input,
    /// return the set of each output. Defaults to every output depending on
    /// every input.
    fn for_jac_sparsity(&self, inputs: &[BTreeSet<usize>], n_out: usize) -> Vec<BTreeSet<usize>> {
        let all: BTreeSet<usize> = inputs.iter().flatten().copied().collect();
        vec![all; n_out]
    }

    /// Reverse Jacobian sparsity: given the set of each output, return the
    /// set of each input. Defaults to dense.
    fn rev_jac_sparsity(&self, n_in: usize, outputs: &[BTreeSet<usize>]) -> Vec<BTreeSet<usize>> {
        let all: BTreeSet<usize> = outputs.iter().flatten().copied().collect();
        vec![all; n_in]
    }
}

/// Handle to a shared atomic operation.
pub struct Atomic<F: Float> {
    op: Arc<dyn AtomicOp<F>>,
}

impl<F: Float> Clone for Atomic<F> {
    fn clone(&self) -> Self {
        Atomic {
            op: Arc::clone(&self.op),
        }
    }
}

impl<F: Float> fmt::Debug for Atomic<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic").field(&self.op.name()).finish()
    }
}

impl<F: Float> Atomic<F> {
    pub fn new(op: impl AtomicOp<F> + 'static) -> Self {
        Atomic { op: Arc::new(op) }
    }

    pub fn from_arc(op: Arc<dyn AtomicOp<F>>) -> Self {
        Atomic { op }
    }

    pub fn name(&self) -> &str {
        self.op.name()
    }

    /// The shared operation, as registered when decoding a tape.
    pub fn op(&self) -> &Arc<dyn AtomicOp<F>> {
        &self.op
    }

    /// Evaluate the operation on `x` producing `n_out` outputs, recording a
    /// single call if any input is a variable of the active tape.
    pub fn call(&self, x: &[Ad<F>], n_out: usize) -> Result<Vec<Ad<F>>>
    where
        F: RecorderThreadLocal,
    {
        let tx: Vec<F> = x.iter().map(Ad::value).collect();
        let mut ty = vec![F::zero(); n_out];
        // User code runs before the recorder is borrowed, so it may itself
        // use Ad values.
        if !self.op.forward(0, 0, &tx, &mut ty) {
            return Err(AdError::AtomicFailed {
                name: self.op.name().to_owned(),
                order: 0,
            });
        }
        record_atomic(&self.op, x, &ty)
    }
}
