use adtape::{record, record_multi, Ad, AdError, Scalar};
use approx::assert_relative_eq;
use num_traits::FromPrimitive;

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

fn reverse_grad(f: impl FnOnce(Ad<f64>) -> Ad<f64>, x0: f64, x: f64) -> f64 {
    let (f, _) = record(|v| f(v[0]), &[x0]).unwrap();
    f.gradient(&[x]).unwrap()[0]
}

fn check_reverse_elemental(
    f_ad: impl FnOnce(Ad<f64>) -> Ad<f64>,
    f_f64: impl Fn(f64) -> f64,
    x: f64,
    tol: f64,
) {
    let grad = reverse_grad(f_ad, x, x);
    assert_relative_eq!(grad, finite_diff(&f_f64, x), max_relative = tol);
}

fn rosenbrock<T: Scalar>(x: &[T]) -> T {
    let one = T::from_f64(1.0).unwrap();
    let hundred = T::from_f64(100.0).unwrap();
    let dx = x[0] - one;
    let t = x[1] - x[0] * x[0];
    dx * dx + hundred * t * t
}

// ── Arithmetic ──

#[test]
fn x_squared() {
    assert_relative_eq!(reverse_grad(|x| x * x, 1.0, 3.0), 6.0, max_relative = 1e-12);
}

#[test]
fn diamond_pattern() {
    // z = x² + x³, dz/dx = 2x + 3x²
    let grad = reverse_grad(|x| x * x + x * x * x, 1.0, 2.0);
    assert_relative_eq!(grad, 4.0 + 12.0, max_relative = 1e-12);
}

#[test]
fn fan_out() {
    assert_relative_eq!(reverse_grad(|x| x + x + x, 0.0, 5.0), 3.0, max_relative = 1e-12);
}

#[test]
fn rosenbrock_gradient() {
    let (f, y) = record(|v| rosenbrock(v), &[1.0, 1.0]).unwrap();
    assert_eq!(y, 0.0);
    let g = f.gradient(&[0.5, 2.0]).unwrap();
    // ∂/∂x0 = 2(x0 - 1) - 400 x0 (x1 - x0²), ∂/∂x1 = 200 (x1 - x0²)
    assert_relative_eq!(g[0], -1.0 - 400.0 * 0.5 * 1.75, max_relative = 1e-12);
    assert_relative_eq!(g[1], 200.0 * 1.75, max_relative = 1e-12);
}

#[test]
fn elementals_match_finite_differences() {
    check_reverse_elemental(|x| x.sin(), f64::sin, 0.7, 1e-5);
    check_reverse_elemental(|x| x.tan(), f64::tan, 0.7, 1e-5);
    check_reverse_elemental(|x| x.exp_m1(), f64::exp_m1, 0.7, 1e-5);
    check_reverse_elemental(|x| x.log10(), f64::log10, 0.7, 1e-5);
    check_reverse_elemental(|x| x.sqrt(), f64::sqrt, 0.7, 1e-5);
    check_reverse_elemental(|x| x.cbrt(), f64::cbrt, 0.7, 1e-5);
    check_reverse_elemental(|x| x.asin(), f64::asin, 0.3, 1e-5);
    check_reverse_elemental(|x| x.acos(), f64::acos, 0.3, 1e-5);
    check_reverse_elemental(|x| x.asinh(), f64::asinh, 0.7, 1e-5);
    check_reverse_elemental(|x| x.atanh(), f64::atanh, 0.3, 1e-5);
    check_reverse_elemental(|x| x.powi(4), |x| x.powi(4), 0.7, 1e-5);
    check_reverse_elemental(|x| x % 0.5, |x| x % 0.5, 0.7, 1e-5);
    check_reverse_elemental(|x| x.fract(), f64::fract, 1.7, 1e-5);
}

#[test]
fn binary_partials() {
    let (f, _) = record(|v| v[0].atan2(v[1]), &[1.0, 2.0]).unwrap();
    let g = f.gradient(&[1.0, 2.0]).unwrap();
    assert_relative_eq!(g[0], 2.0 / 5.0, max_relative = 1e-12);
    assert_relative_eq!(g[1], -1.0 / 5.0, max_relative = 1e-12);

    let (f, _) = record(|v| v[0].hypot(v[1]), &[3.0, 4.0]).unwrap();
    let g = f.gradient(&[3.0, 4.0]).unwrap();
    assert_relative_eq!(g[0], 0.6, max_relative = 1e-12);
    assert_relative_eq!(g[1], 0.8, max_relative = 1e-12);

    let (f, _) = record(|v| v[0].powf(v[1]), &[2.0, 3.0]).unwrap();
    let g = f.gradient(&[2.0, 3.0]).unwrap();
    assert_relative_eq!(g[0], 12.0, max_relative = 1e-12);
    assert_relative_eq!(g[1], 8.0 * 2.0_f64.ln(), max_relative = 1e-12);
}

#[test]
fn max_min_follow_the_selected_operand() {
    let (f, _) = record(|v| v[0].max(v[1]) * 2.0 + v[0].min(v[1]), &[1.0, 2.0]).unwrap();
    assert_eq!(f.gradient(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
    assert_eq!(f.gradient(&[5.0, 2.0]).unwrap(), vec![2.0, 1.0]);
}

// ── Multiple outputs ──

#[test]
fn four_outputs_adjoint() {
    let (f, _) = record_multi(
        |x| vec![x[0] + x[1], x[1] - x[2], x[2] * x[3], x[3] / x[0]],
        &[1.0, 2.0, 3.0, 4.0],
    )
    .unwrap();
    let mut state = f.new_state();
    f.forward(&mut state, 0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let dw = f.reverse(&mut state, 1, &[0.0, 0.0, 0.0, 1.0]).unwrap();
    assert_eq!(dw, vec![-4.0, 0.0, 0.0, 1.0]);
}

#[test]
fn jacobian_agrees_with_forward_jacobian() {
    let (f, _) = record_multi(
        |x| vec![x[0] * x[1].sin(), x[2].exp() - x[0], (x[0] * x[2]).sqrt()],
        &[1.0, 1.0, 1.0],
    )
    .unwrap();
    let x = [0.4, 1.3, 2.2];
    let rev = f.jacobian(&x).unwrap();
    let fwd = f.jacobian_forward(&x).unwrap();
    for (r, c) in rev.iter().zip(&fwd) {
        for (a, b) in r.iter().zip(c) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }
    assert_relative_eq!(rev[0][1], 0.4 * 1.3_f64.cos(), max_relative = 1e-12);
    assert_relative_eq!(rev[1][0], -1.0, max_relative = 1e-12);
}

#[test]
fn vjp_weights_outputs() {
    let (f, _) = record_multi(|x| vec![x[0] * x[1], x[0] + x[1]], &[0.0, 0.0]).unwrap();
    let (y, g) = f.vjp(&[2.0, 3.0], &[1.0, 10.0]).unwrap();
    assert_eq!(y, vec![6.0, 5.0]);
    assert_eq!(g, vec![3.0 + 10.0, 2.0 + 10.0]);
}

#[test]
fn constant_dependent_has_zero_adjoint() {
    let (f, _) = record_multi(|x| vec![Ad::constant(7.0), x[0] * 2.0], &[1.0]).unwrap();
    assert_eq!(f.evaluate(&[4.0]).unwrap(), vec![7.0, 8.0]);
    assert_eq!(f.jacobian(&[4.0]).unwrap(), vec![vec![0.0], vec![2.0]]);
}

// ── Errors ──

#[test]
fn reverse_without_forward_has_no_base_point() {
    let (f, _) = record(|v| v[0] * v[0], &[1.0]).unwrap();
    let mut state = f.new_state();
    let err = f.reverse(&mut state, 1, &[1.0]).unwrap_err();
    assert!(matches!(
        err,
        AdError::NoBasePoint {
            required: 1,
            available: 0
        }
    ));
}

#[test]
fn reverse_order_zero_is_invalid() {
    let (f, _) = record(|v| v[0] * v[0], &[1.0]).unwrap();
    let mut state = f.new_state();
    f.forward(&mut state, 0, &[1.0]).unwrap();
    assert!(matches!(
        f.reverse(&mut state, 0, &[1.0]),
        Err(AdError::InvalidOrder { order: 0 })
    ));
}

#[test]
fn weight_length_is_checked() {
    let (f, _) = record_multi(|x| vec![x[0], x[0] * 2.0], &[1.0]).unwrap();
    let mut state = f.new_state();
    f.forward(&mut state, 0, &[1.0]).unwrap();
    assert!(matches!(
        f.reverse(&mut state, 1, &[1.0, 2.0, 3.0]),
        Err(AdError::ShapeMismatch { .. })
    ));
    assert!(matches!(f.gradient(&[1.0]), Err(AdError::ShapeMismatch { .. })));
}

#[test]
fn powi_with_smallest_exponent() {
    let (f, _) = record(|v| v[0].powi(i32::MIN), &[1.0_f64]).unwrap();
    let n = i32::MIN as f64;
    assert_eq!(f.gradient(&[1.0]).unwrap(), vec![n]);

    // n (n - 1) x^(n - 2) at x = 1
    let h = f.hessian(&[1.0]).unwrap();
    assert_relative_eq!(h[0][0], n * (n - 1.0), max_relative = 1e-12);
}
