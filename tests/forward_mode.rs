use adtape::{record, record_multi, Ad, AdError, Function, FunctionOptions, Scalar, Tape, VecAd};
use approx::assert_relative_eq;
use num_traits::FromPrimitive;

/// Central finite difference for comparison.
fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let h = 1e-7;
    (f(x + h) - f(x - h)) / (2.0 * h)
}

fn check_tangent(f_ad: impl FnOnce(Ad<f64>) -> Ad<f64>, f_f64: impl Fn(f64) -> f64, x0: f64, x: f64) {
    let (f, _) = record(|v| f_ad(v[0]), &[x0]).unwrap();
    let (y, dy) = f.jvp(&[x], &[1.0]).unwrap();
    assert_relative_eq!(y[0], f_f64(x), max_relative = 1e-12);
    assert_relative_eq!(dy[0], finite_diff(&f_f64, x), max_relative = 1e-5);
}

// ── The four-output example ──

fn four_outputs<T: Scalar>(x: &[T]) -> Vec<T> {
    vec![x[0] + x[1], x[1] - x[2], x[2] * x[3], x[3] / x[0]]
}

#[test]
fn four_outputs_values() {
    let x = [1.0, 2.0, 3.0, 4.0];
    let (f, y) = record_multi(|v| four_outputs(v), &x).unwrap();
    assert_eq!(y, vec![3.0, -1.0, 12.0, 4.0]);
    assert_eq!(f.num_independent(), 4);
    assert_eq!(f.num_dependent(), 4);

    let mut state = f.new_state();
    assert_eq!(f.forward(&mut state, 0, &x).unwrap(), vec![3.0, -1.0, 12.0, 4.0]);
}

#[test]
fn four_outputs_directional_derivative() {
    let x = [1.0, 2.0, 3.0, 4.0];
    let (f, _) = record_multi(|v| four_outputs(v), &x).unwrap();
    let mut state = f.new_state();
    f.forward(&mut state, 0, &x).unwrap();
    let dy = f.forward(&mut state, 1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    // ∂/∂x0 of [x0 + x1, x1 - x2, x2 x3, x3 / x0]
    assert_eq!(dy, vec![1.0, 0.0, 0.0, -4.0]);
}

#[test]
fn replay_at_new_point() {
    let (f, _) = record_multi(|v| four_outputs(v), &[1.0, 2.0, 3.0, 4.0]).unwrap();
    let x = [2.0, -1.0, 0.5, 8.0];
    let y = f.evaluate(&x).unwrap();
    assert_eq!(y, four_outputs(&x));
}

// ── Replay properties ──

#[test]
fn forward_is_idempotent() {
    let (f, _) = record(|v| (v[0] * v[1]).sin() + v[1].exp() / v[0], &[0.3f64, 0.7]).unwrap();
    let mut state = f.new_state();
    let a = f.forward(&mut state, 0, &[1.1, -0.4]).unwrap();
    let b = f.forward(&mut state, 0, &[1.1, -0.4]).unwrap();
    assert_eq!(a[0].to_bits(), b[0].to_bits());
}

#[test]
fn replay_matches_recording_bit_for_bit() {
    fn g<T: Scalar>(x: &[T]) -> T {
        let half = T::from_f64(0.5).unwrap();
        (x[0].powi(3) - x[1].ln_1p()).atan2(x[0].hypot(x[1])) * half + x[0].cbrt().tanh()
    }
    let x = [1.7f64, 0.2];
    let (f, y) = record(|v| g(v), &x).unwrap();
    assert_eq!(y.to_bits(), g(&x).to_bits());
    assert_eq!(f.evaluate(&x).unwrap()[0].to_bits(), y.to_bits());

    let x2 = [-2.3f64, 4.0];
    assert_eq!(f.evaluate(&x2).unwrap()[0].to_bits(), g(&x2).to_bits());
}

#[test]
fn state_is_reusable_across_points() {
    let (f, _) = record(|v| v[0] * v[0] * v[1], &[1.0, 1.0]).unwrap();
    let mut state = f.new_state();
    for &(a, b) in &[(1.0, 2.0), (3.0, -1.0), (0.5, 0.5)] {
        let y = f.forward(&mut state, 0, &[a, b]).unwrap();
        assert_eq!(y[0], a * a * b);
        let dy = f.forward(&mut state, 1, &[0.0, 1.0]).unwrap();
        assert_eq!(dy[0], a * a);
    }
}

// ── Elementals against finite differences ──

#[test]
fn elementals_match_finite_differences() {
    check_tangent(|x| x.sin(), f64::sin, 0.1, 0.7);
    check_tangent(|x| x.cos(), f64::cos, 0.1, 0.7);
    check_tangent(|x| x.tan(), f64::tan, 0.1, 0.7);
    check_tangent(|x| x.exp(), f64::exp, 0.1, 0.7);
    check_tangent(|x| x.exp2(), f64::exp2, 0.1, 0.7);
    check_tangent(|x| x.exp_m1(), f64::exp_m1, 0.1, 0.7);
    check_tangent(|x| x.ln(), f64::ln, 0.1, 0.7);
    check_tangent(|x| x.log2(), f64::log2, 0.1, 0.7);
    check_tangent(|x| x.log10(), f64::log10, 0.1, 0.7);
    check_tangent(|x| x.ln_1p(), f64::ln_1p, 0.1, 0.7);
    check_tangent(|x| x.sqrt(), f64::sqrt, 0.1, 0.7);
    check_tangent(|x| x.cbrt(), f64::cbrt, 0.1, -0.7);
    check_tangent(|x| x.recip(), f64::recip, 0.1, 0.7);
    check_tangent(|x| x.asin(), f64::asin, 0.1, 0.3);
    check_tangent(|x| x.acos(), f64::acos, 0.1, 0.3);
    check_tangent(|x| x.atan(), f64::atan, 0.1, 0.3);
    check_tangent(|x| x.sinh(), f64::sinh, 0.1, 0.7);
    check_tangent(|x| x.cosh(), f64::cosh, 0.1, 0.7);
    check_tangent(|x| x.tanh(), f64::tanh, 0.1, 0.7);
    check_tangent(|x| x.asinh(), f64::asinh, 0.1, 0.7);
    check_tangent(|x| x.acosh(), f64::acosh, 1.5, 1.7);
    check_tangent(|x| x.atanh(), f64::atanh, 0.1, 0.3);
    check_tangent(|x| x.abs(), f64::abs, 0.1, -0.7);
    check_tangent(|x| x.powi(-3), |x| x.powi(-3), 0.1, 0.7);
    check_tangent(|x| x.powf(Ad::constant(2.5)), |x| x.powf(2.5), 0.1, 0.7);
    check_tangent(|x| -x * 3.0 + 1.0, |x| -x * 3.0 + 1.0, 0.1, 0.7);
}

#[test]
fn rounding_has_zero_tangent() {
    let ops: [fn(Ad<f64>) -> Ad<f64>; 5] = [Ad::floor, Ad::ceil, Ad::round, Ad::trunc, Ad::signum];
    for op in ops {
        let (f, _) = record(|v| op(v[0]) * v[0], &[1.3]).unwrap();
        let (_, dy) = f.jvp(&[2.6], &[1.0]).unwrap();
        assert_eq!(dy[0], op(Ad::constant(2.6)).value());
    }
}

// ── Shape and ordering errors ──

#[test]
fn higher_order_needs_lower_orders() {
    let (f, _) = record(|v| v[0].exp(), &[0.0]).unwrap();
    let mut state = f.new_state();
    let err = f.forward(&mut state, 2, &[1.0]).unwrap_err();
    assert!(matches!(
        err,
        AdError::NoBasePoint {
            required: 2,
            available: 0
        }
    ));
}

#[test]
fn wrong_input_length_is_rejected() {
    let (f, _) = record(|v| v[0] + v[1], &[0.0, 0.0]).unwrap();
    let mut state = f.new_state();
    let err = f.forward(&mut state, 0, &[1.0, 2.0, 3.0]).unwrap_err();
    assert!(matches!(
        err,
        AdError::ShapeMismatch {
            expected: 2,
            found: 3,
            ..
        }
    ));
}

#[test]
fn f32_tapes() {
    let mut x = [Ad::constant(2.0_f32), Ad::constant(3.0)];
    let tape = Tape::start(&mut x).unwrap();
    let y = x[0] * x[1] + x[0].sin();
    let f = tape.stop(&[y]).unwrap();
    let (v, dv) = f.jvp(&[1.0, 1.0], &[1.0, 0.0]).unwrap();
    assert_relative_eq!(v[0], 1.0 + 1.0_f32.sin(), max_relative = 1e-6);
    assert_relative_eq!(dv[0], 1.0 + 1.0_f32.cos(), max_relative = 1e-6);
}

// ── NaN diagnostic ──

fn checking_nan(f: Function<f64>) -> Function<f64> {
    f.with_options(FunctionOptions {
        check_for_nan: true,
        ..Default::default()
    })
}

#[test]
fn nan_from_finite_leaves_is_reported() {
    let (f, _) = record_multi(|v| vec![v[0] + 1.0, v[0].sqrt()], &[4.0]).unwrap();
    let f = checking_nan(f);
    assert_eq!(f.evaluate(&[9.0]).unwrap(), vec![10.0, 3.0]);
    assert!(matches!(
        f.evaluate(&[-1.0]),
        Err(AdError::NanDiagnostic {
            dependent: 1,
            order: 0
        })
    ));

    // Without the option the NaN is returned as a value.
    let (g, _) = record(|v| v[0].sqrt(), &[4.0f64]).unwrap();
    assert!(g.evaluate(&[-1.0]).unwrap()[0].is_nan());
}

#[test]
fn nan_in_a_dependent_derivative_is_reported() {
    // sqrt has an infinite slope at 0, so 0 · ∞ appears at order 1.
    let (f, _) = record(|v| v[0].sqrt() * v[1], &[4.0, 1.0]).unwrap();
    let f = checking_nan(f);
    let mut state = f.new_state();
    f.forward(&mut state, 0, &[0.0, 0.0]).unwrap();
    assert!(matches!(
        f.forward(&mut state, 1, &[1.0, 0.0]),
        Err(AdError::NanDiagnostic {
            dependent: 0,
            order: 1
        })
    ));
}

#[test]
fn nan_leaves_silence_the_diagnostic() {
    let (f, _) = record(|v| v[0].sqrt(), &[4.0f64]).unwrap();
    let f = checking_nan(f);
    assert!(f.evaluate(&[f64::NAN]).unwrap()[0].is_nan());

    let (f, _) = record(|v| v[0] + f64::NAN, &[1.0]).unwrap();
    let f = checking_nan(f);
    assert!(f.evaluate(&[1.0]).unwrap()[0].is_nan());

    let mut x = [Ad::constant(1.0_f64)];
    let tape = Tape::start(&mut x).unwrap();
    let table = VecAd::new(&[f64::NAN, 2.0]);
    let y = table.load(x[0]).unwrap();
    let f = checking_nan(tape.stop(&[y]).unwrap());
    assert_eq!(f.evaluate(&[1.0]).unwrap(), vec![2.0]);
    assert!(f.evaluate(&[0.0]).unwrap()[0].is_nan());
}

#[test]
fn higher_orders_after_a_nan_base_point_stay_silent() {
    let (f, _) = record(|v| v[0].sqrt(), &[4.0f64]).unwrap();
    let f = checking_nan(f);
    let mut state = f.new_state();
    assert!(f.forward(&mut state, 0, &[f64::NAN]).unwrap()[0].is_nan());
    assert!(f.forward(&mut state, 1, &[1.0]).unwrap()[0].is_nan());
    assert!(f.forward(&mut state, 2, &[0.0]).unwrap()[0].is_nan());

    // Same through the all-orders form.
    let mut state = f.new_state();
    let y = f.forward(&mut state, 1, &[f64::NAN, 1.0]).unwrap();
    assert!(y.iter().all(|v| v.is_nan()));
}
