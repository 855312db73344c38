use adtape::{record, Scalar};
use approx::assert_relative_eq;
use num_traits::FromPrimitive;

fn factorial(k: usize) -> f64 {
    (1..=k).map(|i| i as f64).product()
}

fn rosenbrock<T: Scalar>(x: &[T]) -> T {
    let one = T::from_f64(1.0).unwrap();
    let hundred = T::from_f64(100.0).unwrap();
    let dx = x[0] - one;
    let t = x[1] - x[0] * x[0];
    dx * dx + hundred * t * t
}

// ── Taylor coefficients ──

#[test]
fn exp_taylor_coefficients() {
    let (f, _) = record(|v| v[0].exp(), &[0.0]).unwrap();
    let mut state = f.new_state();
    let x0 = 0.5f64;
    let y = f.forward(&mut state, 4, &[x0, 1.0, 0.0, 0.0, 0.0]).unwrap();
    for (k, yk) in y.iter().enumerate() {
        assert_relative_eq!(*yk, x0.exp() / factorial(k), max_relative = 1e-12);
    }
}

#[test]
fn sin_derivatives_cycle() {
    let (f, _) = record(|v| v[0].sin(), &[0.0]).unwrap();
    let mut state = f.new_state();
    let x0: f64 = 0.3;
    let y = f.forward(&mut state, 4, &[x0, 1.0, 0.0, 0.0, 0.0]).unwrap();
    let derivs = [x0.sin(), x0.cos(), -x0.sin(), -x0.cos(), x0.sin()];
    for k in 0..5 {
        assert_relative_eq!(y[k], derivs[k] / factorial(k), max_relative = 1e-12);
    }
}

#[test]
fn incremental_orders_match_all_at_once() {
    let (f, _) = record(
        |v| (v[0] * v[1]).sqrt() / (v[0] + v[1].tanh()) + v[0].powi(-2),
        &[1.0, 1.0],
    )
    .unwrap();
    let x0 = [1.3, 0.4];
    let x1 = [0.2, -1.0];
    let x2 = [0.5, 0.25];

    let mut inc = f.new_state();
    let y0 = f.forward(&mut inc, 0, &x0).unwrap();
    let y1 = f.forward(&mut inc, 1, &x1).unwrap();
    let y2 = f.forward(&mut inc, 2, &x2).unwrap();

    let mut all = f.new_state();
    let packed = [x0[0], x1[0], x2[0], x0[1], x1[1], x2[1]];
    let y = f.forward(&mut all, 2, &packed).unwrap();
    assert_relative_eq!(y[0], y0[0], max_relative = 1e-14);
    assert_relative_eq!(y[1], y1[0], max_relative = 1e-14);
    assert_relative_eq!(y[2], y2[0], max_relative = 1e-14);
    assert_eq!(inc.orders(), 3);
}

#[test]
fn second_order_coefficient_is_half_the_curvature() {
    // f(x + t v) has second coefficient ½ vᵀHv.
    let (f, _) = record(|v| rosenbrock(v), &[0.0, 0.0]).unwrap();
    let x = [0.5, 2.0];
    let v = [1.0, -2.0];
    let mut state = f.new_state();
    f.forward(&mut state, 0, &x).unwrap();
    f.forward(&mut state, 1, &v).unwrap();
    let y2 = f.forward(&mut state, 2, &[0.0, 0.0]).unwrap()[0];

    let h = f.hessian(&x).unwrap();
    let vhv: f64 = (0..2).map(|i| (0..2).map(|j| v[i] * h[i][j] * v[j]).sum::<f64>()).sum();
    assert_relative_eq!(y2, 0.5 * vhv, max_relative = 1e-12);
}

// ── Hessians ──

#[test]
fn rosenbrock_hessian() {
    let (f, _) = record(|v| rosenbrock(v), &[1.0, 1.0]).unwrap();
    let (x0, x1) = (0.5, 2.0);
    let h = f.hessian(&[x0, x1]).unwrap();
    let expected = [
        [2.0 - 400.0 * (x1 - x0 * x0) + 800.0 * x0 * x0, -400.0 * x0],
        [-400.0 * x0, 200.0],
    ];
    for i in 0..2 {
        for j in 0..2 {
            assert_relative_eq!(h[i][j], expected[i][j], max_relative = 1e-12);
        }
    }
}

#[test]
fn hessian_vector_product() {
    let (f, _) = record(
        |v| v[0].sin() * v[1].exp() + v[2] * v[2] * v[0],
        &[0.0, 0.0, 0.0],
    )
    .unwrap();
    let x = [0.7, -0.3, 1.2];
    let v = [0.5, 1.0, -2.0];
    let (grad, hv) = f.hvp(&x, &v).unwrap();
    let h = f.hessian(&x).unwrap();
    let g = f.gradient(&x).unwrap();
    for i in 0..3 {
        assert_relative_eq!(grad[i], g[i], max_relative = 1e-12);
        let expected: f64 = (0..3).map(|j| h[i][j] * v[j]).sum();
        assert_relative_eq!(hv[i], expected, max_relative = 1e-12, epsilon = 1e-14);
    }
    // Symmetric
    for i in 0..3 {
        for j in 0..3 {
            assert_relative_eq!(h[i][j], h[j][i], max_relative = 1e-12, epsilon = 1e-14);
        }
    }
}

#[test]
fn dense_second_order_weights() {
    // W = w0 y + w1 ẏ for y = x0 x1, ẏ = ∇y·v
    let (f, _) = record(|v| v[0] * v[1], &[0.0, 0.0]).unwrap();
    let mut state = f.new_state();
    f.forward(&mut state, 0, &[2.0, 3.0]).unwrap();
    f.forward(&mut state, 1, &[1.0, 0.0]).unwrap();
    let dw = f.reverse(&mut state, 2, &[0.5, 2.0]).unwrap();
    // ∂W/∂x⁰ = w0 ∇y + w1 H v, ∂W/∂x¹ = w1 ∇y
    assert_eq!(dw, vec![1.5, 6.0, 3.0, 4.0]);
}

#[test]
fn third_order_reverse_of_cube() {
    // y = x³ along x(t) = x0 + t: coefficients x0³, 3x0², 3x0, 1.
    let (f, _) = record(|v| v[0] * v[0] * v[0], &[0.0]).unwrap();
    let mut state = f.new_state();
    let x0 = 2.0;
    f.forward(&mut state, 2, &[x0, 1.0, 0.0]).unwrap();
    // Weight on the second coefficient 3 x0 (for unit tangent).
    let dw = f.reverse(&mut state, 3, &[1.0]).unwrap();
    // ∂y²/∂x⁰ = 3 (x¹)² = 3, ∂y²/∂x¹ = 6 x0 x¹ = 12, ∂y²/∂x² = 3 x0² = 12
    assert_relative_eq!(dw[0], 3.0, max_relative = 1e-12);
    assert_relative_eq!(dw[1], 12.0, max_relative = 1e-12);
    assert_relative_eq!(dw[2], 12.0, max_relative = 1e-12);
}

#[test]
fn transcendental_hessians_match_finite_differences() {
    let (f, _) = record(
        |v| (v[0] / v[1]).atan() + v[0].hypot(v[1]).ln() + v[1].cbrt() * v[0].acosh(),
        &[2.0, 1.0],
    )
    .unwrap();
    let x = [2.0, 1.5];
    let h = f.hessian(&x).unwrap();
    let eps = 1e-6;
    for j in 0..2 {
        let mut xp = x;
        let mut xm = x;
        xp[j] += eps;
        xm[j] -= eps;
        let gp = f.gradient(&xp).unwrap();
        let gm = f.gradient(&xm).unwrap();
        for i in 0..2 {
            let fd = (gp[i] - gm[i]) / (2.0 * eps);
            assert_relative_eq!(h[i][j], fd, max_relative = 1e-5, epsilon = 1e-8);
        }
    }
}
