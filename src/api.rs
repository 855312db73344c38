use crate::ad::Ad;
use crate::error::Result;
use crate::function::Function;
use crate::tape::{RecorderThreadLocal, Tape};

/// Record a scalar function `f : R^n → R` at `x`.
///
/// Returns the frozen [`Function`] and `f(x)`.
///
/// ```
/// let (f, y) = adtape::record(|x: &[adtape::Ad64]| {
///     x[0] * x[0] + x[1] * x[1]
/// }, &[3.0, 4.0]).unwrap();
/// assert_eq!(y, 25.0);
/// let g = f.gradient(&[1.0, 2.0]).unwrap();
/// assert!((g[0] - 2.0).abs() < 1e-12);
/// assert!((g[1] - 4.0).abs() < 1e-12);
/// ```
pub fn record<F: RecorderThreadLocal>(
    f: impl FnOnce(&[Ad<F>]) -> Ad<F>,
    x: &[F],
) -> Result<(Function<F>, F)> {
    let (tape, inputs) = start(x)?;
    let output = f(&inputs);
    let value = output.value();
    Ok((tape.stop(&[output])?, value))
}

/// Record a vector function `f : R^n → R^m` at `x`.
///
/// Returns the frozen [`Function`] and `f(x)`.
pub fn record_multi<F: RecorderThreadLocal>(
    f: impl FnOnce(&[Ad<F>]) -> Vec<Ad<F>>,
    x: &[F],
) -> Result<(Function<F>, Vec<F>)> {
    let (tape, inputs) = start(x)?;
    let outputs = f(&inputs);
    let values = outputs.iter().map(Ad::value).collect();
    Ok((tape.stop(&outputs)?, values))
}

fn start<F: RecorderThreadLocal>(x: &[F]) -> Result<(Tape<F>, Vec<Ad<F>>)> {
    let mut inputs: Vec<Ad<F>> = x.iter().map(|&v| Ad::constant(v)).collect();
    let tape = Tape::start(&mut inputs)?;
    Ok((tape, inputs))
}
