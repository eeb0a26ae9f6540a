//! Scalar root finding: bracketing (bisection, false position) and open
//! (Newton-Raphson, secant) methods.
//!
//! Every method records one [`RootIteration`] per step and fails once the
//! iteration cap is reached without meeting the stop criterion.

use crate::traits::UnivariateFunction;
use anyhow::{bail, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Quantity compared against the tolerance by the bracketing methods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// `|f(c)|` at the newest estimate.
    Error(f64),
    /// Width of the bracket after the update.
    IntervalSize(f64),
}

impl StopCondition {
    pub fn tolerance(&self) -> f64 {
        match *self {
            StopCondition::Error(tol) | StopCondition::IntervalSize(tol) => tol,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketSettings {
    pub stop: StopCondition,
    pub max_iterations: usize,
}

impl Default for BracketSettings {
    fn default() -> Self {
        Self {
            stop: StopCondition::Error(1e-6),
            max_iterations: 9999,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for OpenSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 9999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootIteration {
    pub iteration: usize,
    /// Bracket after the update; `None` for open methods.
    pub bracket: Option<(f64, f64)>,
    pub estimate: f64,
    pub value: f64,
    pub error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResult {
    pub root: f64,
    pub iterations: usize,
    pub error: f64,
    pub history: Vec<RootIteration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bracketing {
    Bisection,
    FalsePosition,
}

impl Bracketing {
    fn name(self) -> &'static str {
        match self {
            Bracketing::Bisection => "Bisection",
            Bracketing::FalsePosition => "False position",
        }
    }

    fn next_point(self, a: f64, b: f64, fa: f64, fb: f64) -> f64 {
        match self {
            Bracketing::Bisection => 0.5 * (a + b),
            Bracketing::FalsePosition => (a * fb - b * fa) / (fb - fa),
        }
    }
}

/// Halves `[a, b]` until the stop criterion holds.
pub fn bisection<F>(f: &F, a: f64, b: f64, settings: BracketSettings) -> Result<RootResult>
where
    F: UnivariateFunction + ?Sized,
{
    bracket_search(f, a, b, settings, Bracketing::Bisection)
}

/// Regula falsi: the new point is where the chord through the bracket ends crosses zero.
pub fn false_position<F>(f: &F, a: f64, b: f64, settings: BracketSettings) -> Result<RootResult>
where
    F: UnivariateFunction + ?Sized,
{
    bracket_search(f, a, b, settings, Bracketing::FalsePosition)
}

fn exact_root(root: f64) -> RootResult {
    RootResult {
        root,
        iterations: 0,
        error: 0.0,
        history: Vec::new(),
    }
}

fn bracket_search<F>(
    f: &F,
    a: f64,
    b: f64,
    settings: BracketSettings,
    method: Bracketing,
) -> Result<RootResult>
where
    F: UnivariateFunction + ?Sized,
{
    let tolerance = settings.stop.tolerance();
    if !(tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }
    if settings.max_iterations == 0 {
        bail!("max_iterations must be greater than zero.");
    }
    if !(a.is_finite() && b.is_finite()) {
        bail!("Interval endpoints must be finite.");
    }
    if b < a {
        bail!("Invalid interval: upper bound {} is below lower bound {}.", b, a);
    }

    let (mut a, mut b) = (a, b);
    let mut fa = f.value(a);
    let mut fb = f.value(b);
    if !(fa.is_finite() && fb.is_finite()) {
        bail!("Function is not finite at the interval endpoints: f(a) = {}, f(b) = {}.", fa, fb);
    }

    if a == b {
        if fa == 0.0 {
            return Ok(exact_root(a));
        }
        bail!("Zero-width interval [{}, {}] does not contain a root.", a, b);
    }
    if fa == 0.0 {
        return Ok(exact_root(a));
    }
    if fb == 0.0 {
        return Ok(exact_root(b));
    }
    if fa.is_sign_negative() == fb.is_sign_negative() {
        bail!(
            "No sign change on [{}, {}]: f(a) = {}, f(b) = {}.",
            a,
            b,
            fa,
            fb
        );
    }

    let mut history = Vec::new();
    for iteration in 1..=settings.max_iterations {
        let c = method.next_point(a, b, fa, fb);
        let fc = f.value(c);
        if !fc.is_finite() {
            bail!("{} produced a non-finite value f({}) = {}.", method.name(), c, fc);
        }

        if fc == 0.0 {
            a = c;
            b = c;
        } else if fa.is_sign_negative() != fc.is_sign_negative() {
            b = c;
            fb = fc;
        } else {
            a = c;
            fa = fc;
        }

        let error = match settings.stop {
            StopCondition::Error(_) => fc.abs(),
            StopCondition::IntervalSize(_) => b - a,
        };
        debug!(
            "{} iteration {}: a = {}, b = {}, c = {}, f(c) = {}, error = {}",
            method.name(),
            iteration,
            a,
            b,
            c,
            fc,
            error
        );
        history.push(RootIteration {
            iteration,
            bracket: Some((a, b)),
            estimate: c,
            value: fc,
            error,
        });

        if fc == 0.0 || error <= tolerance {
            info!(
                "{} converged to {} after {} iterations.",
                method.name(),
                c,
                iteration
            );
            return Ok(RootResult {
                root: c,
                iterations: iteration,
                error,
                history,
            });
        }
    }

    bail!(
        "{} failed to converge in {} iterations (bracket [{}, {}]).",
        method.name(),
        settings.max_iterations,
        a,
        b
    )
}

fn validate_open(settings: &OpenSettings, starts: &[f64]) -> Result<()> {
    if !(settings.tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }
    if settings.max_iterations == 0 {
        bail!("max_iterations must be greater than zero.");
    }
    if starts.iter().any(|x| !x.is_finite()) {
        bail!("Initial estimates must be finite.");
    }
    Ok(())
}

/// Newton-Raphson using the function's own derivative.
pub fn newton_raphson<F>(f: &F, x0: f64, settings: OpenSettings) -> Result<RootResult>
where
    F: UnivariateFunction + ?Sized,
{
    newton_iterate(|x| f.value(x), |x| f.derivative(x), x0, settings)
}

/// Newton-Raphson with an explicitly supplied derivative.
pub fn newton_raphson_with_derivative<F, D>(
    f: &F,
    df: &D,
    x0: f64,
    settings: OpenSettings,
) -> Result<RootResult>
where
    F: UnivariateFunction + ?Sized,
    D: UnivariateFunction + ?Sized,
{
    newton_iterate(|x| f.value(x), |x| df.value(x), x0, settings)
}

fn newton_iterate(
    f: impl Fn(f64) -> f64,
    df: impl Fn(f64) -> f64,
    x0: f64,
    settings: OpenSettings,
) -> Result<RootResult> {
    validate_open(&settings, &[x0])?;

    let mut x = x0;
    let mut history = Vec::new();
    for iteration in 1..=settings.max_iterations {
        let fx = f(x);
        if fx == 0.0 {
            info!("Newton-Raphson hit an exact root at {}.", x);
            return Ok(RootResult {
                root: x,
                iterations: iteration - 1,
                error: 0.0,
                history,
            });
        }
        let dfx = df(x);
        if dfx == 0.0 {
            bail!("Derivative vanished at x = {} (f(x) = {}).", x, fx);
        }

        let next = x - fx / dfx;
        if !next.is_finite() {
            bail!("Newton-Raphson diverged at iteration {} (x = {}).", iteration, next);
        }
        let error = (next - x).abs();
        debug!(
            "Newton-Raphson iteration {}: x = {}, f(x) = {}, f'(x) = {}, next = {}, error = {}",
            iteration, x, fx, dfx, next, error
        );
        history.push(RootIteration {
            iteration,
            bracket: None,
            estimate: next,
            value: fx,
            error,
        });
        x = next;

        if error <= settings.tolerance {
            info!("Newton-Raphson converged to {} after {} iterations.", x, iteration);
            return Ok(RootResult {
                root: x,
                iterations: iteration,
                error,
                history,
            });
        }
    }

    bail!(
        "Newton-Raphson failed to converge in {} iterations (x = {}).",
        settings.max_iterations,
        x
    )
}

/// Secant method started from two estimates.
pub fn secant<F>(f: &F, x0: f64, x1: f64, settings: OpenSettings) -> Result<RootResult>
where
    F: UnivariateFunction + ?Sized,
{
    validate_open(&settings, &[x0, x1])?;

    let (mut x_prev, mut x_cur) = (x0, x1);
    let mut f_prev = f.value(x_prev);
    let mut f_cur = f.value(x_cur);
    if f_cur == 0.0 {
        return Ok(exact_root(x_cur));
    }

    let mut history = Vec::new();
    for iteration in 1..=settings.max_iterations {
        if f_cur == f_prev {
            bail!(
                "Secant denominator vanished: f({}) = f({}) = {}.",
                x_prev,
                x_cur,
                f_cur
            );
        }
        let next = (f_cur * x_prev - f_prev * x_cur) / (f_cur - f_prev);
        if !next.is_finite() {
            bail!("Secant method diverged at iteration {} (x = {}).", iteration, next);
        }
        let error = (next - x_cur).abs();
        let f_next = f.value(next);
        debug!(
            "Secant iteration {}: x_prev = {}, x = {}, next = {}, f(next) = {}, error = {}",
            iteration, x_prev, x_cur, next, f_next, error
        );
        history.push(RootIteration {
            iteration,
            bracket: None,
            estimate: next,
            value: f_next,
            error,
        });

        x_prev = x_cur;
        f_prev = f_cur;
        x_cur = next;
        f_cur = f_next;

        if error <= settings.tolerance || f_cur == 0.0 {
            info!("Secant method converged to {} after {} iterations.", x_cur, iteration);
            return Ok(RootResult {
                root: x_cur,
                iterations: iteration,
                error,
                history,
            });
        }
    }

    bail!(
        "Secant method failed to converge in {} iterations (x = {}).",
        settings.max_iterations,
        x_cur
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::Expression;
    use approx::assert_abs_diff_eq;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn cubic(x: f64) -> f64 {
        x * x * x - 2.0 * x - 5.0
    }

    const CUBIC_ROOT: f64 = 2.094_551_481_542_327;

    #[test]
    fn bisection_meets_interval_size() {
        let settings = BracketSettings {
            stop: StopCondition::IntervalSize(1e-8),
            ..Default::default()
        };
        let result = bisection(&cubic, 2.0, 3.0, settings).expect("bisection should converge");
        assert_abs_diff_eq!(result.root, CUBIC_ROOT, epsilon = 1e-7);
        let (a, b) = result.history.last().unwrap().bracket.unwrap();
        assert!(b - a <= 1e-8);
        // Width halves every step: 1 / 2^27 < 1e-8.
        assert_eq!(result.iterations, 27);
    }

    #[test]
    fn false_position_meets_function_error() {
        let settings = BracketSettings {
            stop: StopCondition::Error(1e-10),
            ..Default::default()
        };
        let result = false_position(&cubic, 2.0, 3.0, settings).expect("should converge");
        assert!(cubic(result.root).abs() <= 1e-10);
        assert_eq!(result.history.len(), result.iterations);
    }

    #[test]
    fn bracketing_edge_cases() {
        let settings = BracketSettings::default();
        assert_err_contains(bisection(&cubic, 3.0, 2.0, settings), "Invalid interval");
        assert_err_contains(bisection(&cubic, -1.0, 1.0, settings), "No sign change");
        assert_err_contains(bisection(&cubic, 1.0, 1.0, settings), "Zero-width interval");

        let line = |x: f64| x - 1.0;
        assert_eq!(bisection(&line, 1.0, 1.0, settings).unwrap().root, 1.0);
        let exact = false_position(&line, 0.0, 1.0, settings).unwrap();
        assert_eq!((exact.root, exact.iterations), (1.0, 0));
        // Midpoint hits the root exactly.
        let mid = bisection(&line, 0.0, 2.0, settings).unwrap();
        assert_eq!((mid.root, mid.iterations, mid.error), (1.0, 1, 0.0));
    }

    #[test]
    fn bracketing_keeps_sign_change_for_tiny_values() {
        // f(a) * f(c) underflows to -0.0 here.
        let tiny = |x: f64| (x - 0.3) * 1e-170;
        let settings = BracketSettings {
            stop: StopCondition::IntervalSize(1e-10),
            ..Default::default()
        };
        let result = bisection(&tiny, 0.0, 1.0, settings).unwrap();
        assert_abs_diff_eq!(result.root, 0.3, epsilon = 1e-9);
        for step in &result.history {
            let (a, b) = step.bracket.unwrap();
            assert!(a <= 0.3 && 0.3 <= b);
        }

        let same_side = |x: f64| (x + 1.0) * 1e-170;
        assert_err_contains(bisection(&same_side, 0.0, 1.0, settings), "No sign change");
        let pole = |x: f64| 1.0 / x;
        assert_err_contains(bisection(&pole, 0.0, 1.0, settings), "not finite");
    }

    #[test]
    fn bracketing_stops_at_the_iteration_cap() {
        let settings = BracketSettings {
            stop: StopCondition::IntervalSize(1e-12),
            max_iterations: 5,
        };
        assert_err_contains(bisection(&cubic, 2.0, 3.0, settings), "failed to converge in 5");
    }

    #[test]
    fn newton_uses_expression_derivative() {
        let f = Expression::parse("x^3 - 2*x - 5", &["x"]).unwrap();
        let settings = OpenSettings {
            tolerance: 1e-12,
            ..Default::default()
        };
        let result = newton_raphson(&f, 2.0, settings).expect("newton should converge");
        assert_abs_diff_eq!(result.root, CUBIC_ROOT, epsilon = 1e-12);
        assert!(result.iterations <= 6);
        assert_eq!(result.history.last().unwrap().estimate, result.root);
    }

    #[test]
    fn newton_with_explicit_derivative_and_zero_slope() {
        let df = |x: f64| 3.0 * x * x - 2.0;
        let result =
            newton_raphson_with_derivative(&cubic, &df, 2.0, OpenSettings::default()).unwrap();
        assert_abs_diff_eq!(result.root, CUBIC_ROOT, epsilon = 1e-6);

        let flat = |x: f64| x * x + 1.0;
        assert_err_contains(
            newton_raphson(&flat, 0.0, OpenSettings::default()),
            "Derivative vanished",
        );
    }

    #[test]
    fn secant_converges_and_detects_flat_pairs() {
        let result = secant(&cubic, 2.0, 3.0, OpenSettings::default()).unwrap();
        assert_abs_diff_eq!(result.root, CUBIC_ROOT, epsilon = 1e-6);

        let even = |x: f64| x * x - 4.0;
        assert_err_contains(
            secant(&even, -1.0, 1.0, OpenSettings::default()),
            "Secant denominator vanished",
        );
    }

    #[test]
    fn open_methods_validate_settings() {
        let settings = OpenSettings {
            tolerance: 0.0,
            ..Default::default()
        };
        assert_err_contains(secant(&cubic, 2.0, 3.0, settings), "tolerance must be positive");
        let capped = OpenSettings {
            tolerance: 1e-15,
            max_iterations: 1,
        };
        assert_err_contains(newton_raphson(&cubic, 2.0, capped), "failed to converge in 1");
    }

    #[test]
    fn stop_condition_serde_form() {
        let stop: StopCondition = serde_json::from_str(r#"{"interval_size": 0.001}"#).unwrap();
        assert_eq!(stop, StopCondition::IntervalSize(0.001));
        let settings: BracketSettings = serde_json::from_str(r#"{"stop": {"error": 1e-4}}"#).unwrap();
        assert_eq!(settings.stop, StopCondition::Error(1e-4));
        assert_eq!(settings.max_iterations, 9999);
    }
}
