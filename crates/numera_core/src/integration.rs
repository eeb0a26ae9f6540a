//! Newton-Cotes quadrature over functions and tabulated samples.

use crate::differentiation::central_fourth_derivative;
use crate::traits::UnivariateFunction;
use anyhow::{bail, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
}

impl Sample {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Tabulates `f` at `n + 1` equally spaced points of `[a, b]`.
pub fn tabulate<F>(f: &F, a: f64, b: f64, n: usize) -> Vec<Sample>
where
    F: UnivariateFunction + ?Sized,
{
    let h = (b - a) / n as f64;
    (0..=n)
        .map(|i| {
            let x = a + i as f64 * h;
            Sample::new(x, f.value(x))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadratureEstimate {
    pub value: f64,
    /// Magnitude of the truncation-error estimate.
    pub error: f64,
    pub intervals: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveQuadrature {
    pub estimate: QuadratureEstimate,
    /// Every estimate tried, coarsest first.
    pub attempts: Vec<QuadratureEstimate>,
}

fn validate_interval(a: f64, b: f64, n: usize) -> Result<()> {
    if !(a.is_finite() && b.is_finite()) || b <= a {
        bail!("Invalid interval [{}, {}].", a, b);
    }
    if n == 0 {
        bail!("Number of sub-intervals must be greater than zero.");
    }
    Ok(())
}

fn mean_at_nodes(a: f64, h: f64, n: usize, g: impl Fn(f64) -> f64) -> f64 {
    (0..=n).map(|i| g(a + i as f64 * h)).sum::<f64>() / (n + 1) as f64
}

/// Composite trapezoidal rule with `|(b-a)^3 / (12 n^2) · mean f''|` as the error.
pub fn trapezoid<F>(f: &F, a: f64, b: f64, n: usize) -> Result<QuadratureEstimate>
where
    F: UnivariateFunction + ?Sized,
{
    validate_interval(a, b, n)?;
    let samples = tabulate(f, a, b, n);
    let h = (b - a) / n as f64;
    let interior: f64 = samples[1..n].iter().map(|s| s.y).sum();
    let value = h / 2.0 * (samples[0].y + 2.0 * interior + samples[n].y);

    let mean_second = mean_at_nodes(a, h, n, |x| f.second_derivative(x));
    let error = ((b - a).powi(3) / (12.0 * (n * n) as f64) * mean_second).abs();

    Ok(QuadratureEstimate {
        value,
        error,
        intervals: n,
    })
}

/// Refines the trapezoidal rule `n = 1, 2, ...` until the error estimate
/// drops to `tolerance`.
pub fn adaptive_trapezoid<F>(
    f: &F,
    a: f64,
    b: f64,
    tolerance: f64,
    max_intervals: usize,
) -> Result<AdaptiveQuadrature>
where
    F: UnivariateFunction + ?Sized,
{
    if !(tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }
    validate_interval(a, b, max_intervals)?;

    let mut attempts = Vec::new();
    for n in 1..=max_intervals {
        let estimate = trapezoid(f, a, b, n)?;
        debug!(
            "Trapezoid n = {}: value = {}, error = {}",
            n, estimate.value, estimate.error
        );
        attempts.push(estimate);
        if estimate.error <= tolerance {
            info!("Trapezoid rule met tolerance with {} sub-intervals.", n);
            return Ok(AdaptiveQuadrature { estimate, attempts });
        }
    }

    bail!(
        "Trapezoid rule did not reach tolerance {} within {} sub-intervals.",
        tolerance,
        max_intervals
    )
}

/// Spacing of uniformly spaced, increasing samples.
fn uniform_step(samples: &[Sample]) -> Result<f64> {
    let h = samples[1].x - samples[0].x;
    if !(h > 0.0) {
        bail!("Sample abscissae must be strictly increasing.");
    }
    for pair in samples.windows(2) {
        let step = pair[1].x - pair[0].x;
        if (step - h).abs() > 1e-9 * h.max(1.0) {
            bail!(
                "Samples must be equally spaced (step {} differs from {}).",
                step,
                h
            );
        }
    }
    Ok(h)
}

/// Simple Simpson 1/3 rule on exactly three points.
pub fn simpson_13(samples: &[Sample]) -> Result<f64> {
    if samples.len() != 3 {
        bail!("Simpson 1/3 rule needs exactly 3 points, got {}.", samples.len());
    }
    uniform_step(samples)?;
    let [p0, p1, p2] = [samples[0], samples[1], samples[2]];
    Ok((p2.x - p0.x) * (p0.y + 4.0 * p1.y + p2.y) / 6.0)
}

/// Composite Simpson 1/3 rule on an odd number of points.
pub fn simpson_13_composite(samples: &[Sample]) -> Result<f64> {
    let len = samples.len();
    if len < 3 || len % 2 == 0 {
        bail!(
            "Composite Simpson 1/3 rule needs an odd number of points (at least 3), got {}.",
            len
        );
    }
    let h = uniform_step(samples)?;
    let n = len - 1;
    let mut sum = samples[0].y + samples[n].y;
    for (i, s) in samples.iter().enumerate().take(n).skip(1) {
        sum += if i % 2 == 1 { 4.0 * s.y } else { 2.0 * s.y };
    }
    Ok(h / 3.0 * sum)
}

/// Composite Simpson 1/3 rule over `n` (even) sub-intervals of `[a, b]`, with
/// `|(b-a)^5 / (180 n^4) · mean f''''|` as the error.
pub fn simpson_13_function<F>(f: &F, a: f64, b: f64, n: usize) -> Result<QuadratureEstimate>
where
    F: UnivariateFunction + ?Sized,
{
    validate_interval(a, b, n)?;
    if n % 2 != 0 {
        bail!("Simpson 1/3 rule needs an even number of sub-intervals, got {}.", n);
    }
    let value = simpson_13_composite(&tabulate(f, a, b, n))?;

    let h = (b - a) / n as f64;
    let stencil = 1e-2 * (b - a).abs().max(1.0);
    let mean_fourth = mean_at_nodes(a, h, n, |x| central_fourth_derivative(f, x, stencil));
    let error = ((b - a).powi(5) / (180.0 * (n as f64).powi(4)) * mean_fourth).abs();

    Ok(QuadratureEstimate {
        value,
        error,
        intervals: n,
    })
}

/// Simple Simpson 3/8 rule on exactly four points.
pub fn simpson_38(samples: &[Sample]) -> Result<f64> {
    if samples.len() != 4 {
        bail!("Simpson 3/8 rule needs exactly 4 points, got {}.", samples.len());
    }
    uniform_step(samples)?;
    let [p0, p1, p2, p3] = [samples[0], samples[1], samples[2], samples[3]];
    Ok((p3.x - p0.x) * (p0.y + 3.0 * p1.y + 3.0 * p2.y + p3.y) / 8.0)
}

/// Composite Simpson 3/8 rule; the number of intervals must be a multiple of 3.
pub fn simpson_38_composite(samples: &[Sample]) -> Result<f64> {
    let len = samples.len();
    if len < 4 || (len - 1) % 3 != 0 {
        bail!(
            "Composite Simpson 3/8 rule needs 3k + 1 points (k >= 1), got {}.",
            len
        );
    }
    let h = uniform_step(samples)?;
    let n = len - 1;
    let mut sum = samples[0].y + samples[n].y;
    for (i, s) in samples.iter().enumerate().take(n).skip(1) {
        sum += if i % 3 == 0 { 2.0 * s.y } else { 3.0 * s.y };
    }
    Ok(3.0 * h / 8.0 * sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::Expression;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn points(xs: &[f64], f: impl Fn(f64) -> f64) -> Vec<Sample> {
        xs.iter().map(|&x| Sample::new(x, f(x))).collect()
    }

    #[test]
    fn trapezoid_value_and_error_estimate() {
        let f = Expression::parse("x^2", &["x"]).unwrap();
        let est = trapezoid(&f, 0.0, 1.0, 4).unwrap();
        // Exact error of the rule for x^2 is h^2 (b-a) / 6.
        assert_abs_diff_eq!(est.value, 1.0 / 3.0 + 1.0 / 96.0, epsilon = 1e-12);
        assert_abs_diff_eq!(est.error, 1.0 / (12.0 * 16.0) * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn adaptive_trapezoid_refines_until_tolerance() {
        let f = Expression::parse("exp(x)", &["x"]).unwrap();
        let result = adaptive_trapezoid(&f, 0.0, 1.0, 1e-3, 100).unwrap();
        let n = result.estimate.intervals;
        assert_eq!(result.attempts.len(), n);
        assert!(result.estimate.error <= 1e-3);
        assert!(result.attempts[n - 2].error > 1e-3);
        assert_abs_diff_eq!(result.estimate.value, 1f64.exp() - 1.0, epsilon = 2e-3);

        let linear = Expression::parse("3*x + 1", &["x"]).unwrap();
        let exact = adaptive_trapezoid(&linear, 0.0, 2.0, 1e-9, 100).unwrap();
        assert_eq!(exact.estimate.intervals, 1);
        assert_abs_diff_eq!(exact.estimate.value, 8.0);
    }

    #[test]
    fn adaptive_trapezoid_fails_at_cap() {
        let f = |x: f64| x.exp();
        assert_err_contains(
            adaptive_trapezoid(&f, 0.0, 1.0, 1e-12, 5),
            "did not reach tolerance",
        );
    }

    #[test]
    fn simpson_rules_are_exact_for_cubics() {
        let cubic = |x: f64| x.powi(3) - x + 2.0;
        let exact = |a: f64, b: f64| (b.powi(4) - a.powi(4)) / 4.0 - (b * b - a * a) / 2.0 + 2.0 * (b - a);

        let three = points(&[0.0, 1.0, 2.0], cubic);
        assert_relative_eq!(simpson_13(&three).unwrap(), exact(0.0, 2.0), epsilon = 1e-12);

        let seven = points(&[0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0], cubic);
        assert_relative_eq!(simpson_13_composite(&seven).unwrap(), exact(0.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(simpson_38_composite(&seven).unwrap(), exact(0.0, 3.0), epsilon = 1e-12);

        let four = points(&[1.0, 2.0, 3.0, 4.0], cubic);
        assert_relative_eq!(simpson_38(&four).unwrap(), exact(1.0, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn simpson_function_reports_error_estimate() {
        let f = Expression::parse("x^4", &["x"]).unwrap();
        let est = simpson_13_function(&f, 0.0, 1.0, 4).unwrap();
        assert_abs_diff_eq!(est.value, 0.2, epsilon = 1e-3);
        // f'''' = 24 everywhere.
        assert_abs_diff_eq!(est.error, 24.0 / (180.0 * 256.0), epsilon = 1e-6);
        assert_abs_diff_eq!(est.value - 0.2, est.error, epsilon = 1e-6);
    }

    #[test]
    fn sample_count_validation() {
        let two = points(&[0.0, 1.0], |x| x);
        assert_err_contains(simpson_13(&two), "exactly 3 points");
        assert_err_contains(simpson_38(&two), "exactly 4 points");
        let four = points(&[0.0, 1.0, 2.0, 3.0], |x| x);
        assert_err_contains(simpson_13_composite(&four), "odd number of points");
        let five = points(&[0.0, 1.0, 2.0, 3.0, 4.0], |x| x);
        assert_err_contains(simpson_38_composite(&five), "3k + 1 points");
        let uneven = points(&[0.0, 1.0, 3.0], |x| x);
        assert_err_contains(simpson_13(&uneven), "equally spaced");

        let f = |x: f64| x;
        assert_err_contains(simpson_13_function(&f, 0.0, 1.0, 3), "even number");
        assert_err_contains(trapezoid(&f, 0.0, 1.0, 0), "greater than zero");
        assert_err_contains(trapezoid(&f, 1.0, 0.0, 2), "Invalid interval");
    }
}
