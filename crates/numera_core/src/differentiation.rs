use crate::traits::UnivariateFunction;
use anyhow::{bail, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub fn central_first_derivative<F>(f: &F, x: f64, h: f64) -> f64
where
    F: UnivariateFunction + ?Sized,
{
    (f.value(x + h) - f.value(x - h)) / (2.0 * h)
}

pub fn central_second_derivative<F>(f: &F, x: f64, h: f64) -> f64
where
    F: UnivariateFunction + ?Sized,
{
    (f.value(x + h) - 2.0 * f.value(x) + f.value(x - h)) / (h * h)
}

/// Five-point stencil for `f''''(x)`.
pub fn central_fourth_derivative<F>(f: &F, x: f64, h: f64) -> f64
where
    F: UnivariateFunction + ?Sized,
{
    (f.value(x - 2.0 * h) - 4.0 * f.value(x - h) + 6.0 * f.value(x) - 4.0 * f.value(x + h)
        + f.value(x + 2.0 * h))
        / h.powi(4)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivativeSample {
    pub x: f64,
    pub y: f64,
    pub first: f64,
    pub second: f64,
}

/// Tabulates `f`, `f'` and `f''` from `x_start` in steps of `h`.
///
/// Stops at the first point at or past `x_end`, which defaults to
/// `x_start + 100 h`. A negative `h` walks leftwards.
pub fn differentiate_range<F>(
    f: &F,
    x_start: f64,
    x_end: Option<f64>,
    h: f64,
) -> Result<Vec<DerivativeSample>>
where
    F: UnivariateFunction + ?Sized,
{
    if h == 0.0 || !h.is_finite() {
        bail!("Step size must be non-zero and finite, got {}.", h);
    }
    let x_end = x_end.unwrap_or(x_start + 100.0 * h);
    if (x_end - x_start) * h < 0.0 {
        bail!(
            "Step {} moves away from x_end = {} starting at {}.",
            h,
            x_end,
            x_start
        );
    }

    let steps = ((x_end - x_start) / h).ceil().max(0.0) as usize;
    let mut table = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        // Index-based abscissae so rounding does not accumulate.
        let x = x_start + i as f64 * h;
        let sample = DerivativeSample {
            x,
            y: f.value(x),
            first: central_first_derivative(f, x, h),
            second: central_second_derivative(f, x, h),
        };
        debug!(
            "x = {}, f = {}, f' = {}, f'' = {}",
            sample.x, sample.y, sample.first, sample.second
        );
        table.push(sample);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn stencils_on_polynomials() {
        let f = |x: f64| x.powi(3);
        assert_abs_diff_eq!(central_first_derivative(&f, 2.0, 1e-3), 12.0, epsilon = 1e-5);
        assert_abs_diff_eq!(central_second_derivative(&f, 2.0, 1e-3), 12.0, epsilon = 1e-4);
        let quartic = |x: f64| x.powi(4);
        assert_abs_diff_eq!(central_fourth_derivative(&quartic, 0.7, 1e-2), 24.0, epsilon = 1e-4);
    }

    #[test]
    fn range_defaults_to_hundred_steps() {
        let table = differentiate_range(&|x: f64| x.sin(), 0.0, None, 0.01).unwrap();
        assert_eq!(table.len(), 101);
        assert_abs_diff_eq!(table[100].x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(table[0].first, 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(table[50].second, -(0.5f64.sin()), epsilon = 1e-4);
    }

    #[test]
    fn range_includes_last_point_reached() {
        let table = differentiate_range(&|x: f64| x * x, 0.0, Some(0.25), 0.1).unwrap();
        let xs: Vec<f64> = table.iter().map(|s| s.x).collect();
        assert_eq!(xs.len(), 4);
        assert_abs_diff_eq!(xs[3], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn range_rejects_bad_steps() {
        let err = differentiate_range(&|x: f64| x, 0.0, None, 0.0).unwrap_err();
        assert!(format!("{err}").contains("Step size must be non-zero"));
        let err = differentiate_range(&|x: f64| x, 0.0, Some(-1.0), 0.1).unwrap_err();
        assert!(format!("{err}").contains("moves away"));
    }
}
