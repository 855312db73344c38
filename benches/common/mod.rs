use adtape::Scalar;
use num_traits::FromPrimitive;

fn lit<T: Scalar>(v: f64) -> T {
    T::from_f(<T::Float as FromPrimitive>::from_f64(v).unwrap())
}

// ─── Rosenbrock ────────────────────────────────────────────────────────────

pub fn rosenbrock<T: Scalar>(x: &[T]) -> T {
    let one = lit::<T>(1.0);
    let hundred = lit::<T>(100.0);
    let mut sum = T::zero();
    for i in 0..x.len() - 1 {
        let t1 = one - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum = sum + t1 * t1 + hundred * t2 * t2;
    }
    sum
}

pub fn rosenbrock_f64(x: &[f64]) -> f64 {
    rosenbrock(x)
}

// ─── Rastrigin ─────────────────────────────────────────────────────────────
// f(x) = 10n + Σ[x_i² - 10·cos(2π·x_i)]

pub fn rastrigin<T: Scalar>(x: &[T]) -> T {
    let ten = lit::<T>(10.0);
    let two_pi = lit::<T>(2.0 * std::f64::consts::PI);
    let mut sum = ten * lit::<T>(x.len() as f64);
    for &xi in x {
        sum = sum + xi * xi - ten * (two_pi * xi).cos();
    }
    sum
}

// ─── Poisson residuals ─────────────────────────────────────────────────────
// r_i = 2u_i - u_{i-1} - u_{i+1} - h², Dirichlet u_0 = u_{N+1} = 0

pub fn poisson_residuals<T: Scalar>(x: &[T]) -> Vec<T> {
    let n = x.len();
    let h = 1.0 / (n as f64 + 1.0);
    let h2 = lit::<T>(h * h);
    let two = lit::<T>(2.0);
    (0..n)
        .map(|i| {
            let prev = if i == 0 { T::zero() } else { x[i - 1] };
            let next = if i == n - 1 { T::zero() } else { x[i + 1] };
            two * x[i] - prev - next - h2
        })
        .collect()
}

// ─── Finite Differences ────────────────────────────────────────────────────

pub fn finite_diff_gradient(f: impl Fn(&[f64]) -> f64, x: &[f64], h: f64) -> Vec<f64> {
    let mut xp = x.to_vec();
    (0..x.len())
        .map(|i| {
            xp[i] = x[i] + h;
            let fp = f(&xp);
            xp[i] = x[i] - h;
            let fm = f(&xp);
            xp[i] = x[i];
            (fp - fm) / (2.0 * h)
        })
        .collect()
}

// ─── Helpers ───────────────────────────────────────────────────────────────

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}

pub fn make_direction(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.1 * (i + 1) as f64).collect()
}
