use crate::integration::Sample;
use crate::linear::{gauss_elimination, LinearSystem, Pivoting};
use anyhow::{bail, Context, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Least-squares line `y = a0 + a1 x` with correlation coefficient `r`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub a0: f64,
    pub a1: f64,
    pub r: f64,
}

impl LinearFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.a0 + self.a1 * x
    }
}

pub fn linear_regression(points: &[Sample]) -> Result<LinearFit> {
    if points.len() < 2 {
        bail!("Linear regression needs at least 2 points, got {}.", points.len());
    }
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        sx += p.x;
        sy += p.y;
        sxx += p.x * p.x;
        sxy += p.x * p.y;
        syy += p.y * p.y;
    }

    // Centered sums below this fraction of the raw sums are cancellation noise.
    const DEGENERATE: f64 = 1e-12;

    let sxx_c = n * sxx - sx * sx;
    if sxx_c <= DEGENERATE * n * sxx {
        bail!("Linear regression is undefined when every x is equal.");
    }
    let sxy_c = n * sxy - sx * sy;
    let syy_c = n * syy - sy * sy;

    let a1 = sxy_c / sxx_c;
    let a0 = (sy - a1 * sx) / n;
    // A constant y is reproduced exactly by the horizontal line.
    let r = if syy_c <= DEGENERATE * n * syy {
        1.0
    } else {
        sxy_c / (sxx_c * syy_c).sqrt()
    };
    debug!("Linear regression: a0 = {}, a1 = {}, r = {}", a0, a1, r);

    Ok(LinearFit { a0, a1, r })
}

/// Polynomial `sum(coefficients[i] * x^i)` from the discrete normal equations.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialFit {
    pub coefficients: Vec<f64>,
    /// `M[j][i] = sum(x^i * x^j)` over the samples.
    pub normal_matrix: DMatrix<f64>,
    /// `b[i] = sum(y * x^i)`.
    pub normal_rhs: DVector<f64>,
}

impl PolynomialFit {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// Renders the polynomial in the expression engine's syntax.
    pub fn to_expression(&self, variable: &str) -> String {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(i, a)| format!("({:?} * {}^{})", a, variable, i))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

pub fn least_squares(points: &[Sample], degree: usize) -> Result<PolynomialFit> {
    let size = degree + 1;
    if points.len() < size {
        bail!(
            "Degree {} fit needs at least {} points, got {}.",
            degree,
            size,
            points.len()
        );
    }

    // u_i evaluated at every sample: basis[(k, i)] = x_k^i.
    let basis = DMatrix::from_fn(points.len(), size, |k, i| points[k].x.powi(i as i32));
    let ys = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));

    let normal_matrix = basis.transpose() * &basis;
    let normal_rhs = basis.transpose() * ys;

    let rows: Vec<Vec<f64>> = normal_matrix
        .row_iter()
        .map(|row| row.iter().cloned().collect())
        .collect();
    let system = LinearSystem::from_rows(&rows, normal_rhs.as_slice())?;
    let solved = gauss_elimination(&system, Pivoting::Partial)
        .context("Normal equations are singular; need more distinct x values.")?;
    debug!("Least squares coefficients: {}", solved.solution);

    Ok(PolynomialFit {
        coefficients: solved.solution.iter().cloned().collect(),
        normal_matrix,
        normal_rhs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::Expression;
    use approx::assert_abs_diff_eq;

    fn samples(data: &[(f64, f64)]) -> Vec<Sample> {
        data.iter().map(|&(x, y)| Sample::new(x, y)).collect()
    }

    #[test]
    fn regression_on_noisy_line() {
        let pts = samples(&[
            (1.0, 0.5),
            (2.0, 2.5),
            (3.0, 2.0),
            (4.0, 4.0),
            (5.0, 3.5),
            (6.0, 6.0),
            (7.0, 5.5),
        ]);
        let fit = linear_regression(&pts).unwrap();
        assert_abs_diff_eq!(fit.a1, 0.839_285_714_285_714_3, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.a0, 0.071_428_571_428_571_4, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.r, 0.931_835_613_218_819, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.evaluate(2.0), fit.a0 + 2.0 * fit.a1);
    }

    #[test]
    fn regression_rejects_degenerate_input() {
        let err = linear_regression(&samples(&[(1.0, 2.0)])).unwrap_err();
        assert!(format!("{err}").contains("at least 2 points"));
        let err = linear_regression(&samples(&[(1.0, 2.0), (1.0, 3.0)])).unwrap_err();
        assert!(format!("{err}").contains("every x is equal"));

        let flat = linear_regression(&samples(&[(0.0, 3.0), (1.0, 3.0)])).unwrap();
        assert_eq!((flat.a0, flat.a1, flat.r), (3.0, 0.0, 1.0));
    }

    #[test]
    fn regression_tolerates_rounding_in_constant_data() {
        let level: Vec<Sample> = (1..=7).map(|i| Sample::new(i as f64, 0.1)).collect();
        let fit = linear_regression(&level).unwrap();
        assert_eq!(fit.r, 1.0);
        assert_abs_diff_eq!(fit.a1, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(fit.a0, 0.1, epsilon = 1e-15);

        let column: Vec<Sample> = (1..=7).map(|i| Sample::new(0.1, i as f64)).collect();
        let err = linear_regression(&column).unwrap_err();
        assert!(format!("{err}").contains("every x is equal"));
    }

    #[test]
    fn least_squares_recovers_quadratic() {
        let pts: Vec<Sample> = (0..6)
            .map(|i| {
                let x = i as f64 * 0.5;
                Sample::new(x, 1.0 - 2.0 * x + 0.5 * x * x)
            })
            .collect();
        let fit = least_squares(&pts, 2).unwrap();
        for (got, want) in fit.coefficients.iter().zip([1.0, -2.0, 0.5]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-9);
        }
        assert_eq!(fit.degree(), 2);
        assert_abs_diff_eq!(fit.normal_matrix[(0, 0)], 6.0);
        assert_abs_diff_eq!(fit.normal_matrix[(1, 0)], fit.normal_matrix[(0, 1)]);
        assert_abs_diff_eq!(fit.evaluate(4.0), 1.0, epsilon = 1e-8);

        let text = fit.to_expression("x");
        let parsed = Expression::parse(&text, &["x"]).expect("rendered fit should parse");
        assert_abs_diff_eq!(parsed.eval(&[1.5]), fit.evaluate(1.5), epsilon = 1e-12);
    }

    #[test]
    fn least_squares_needs_enough_points() {
        let pts = samples(&[(0.0, 1.0), (1.0, 2.0)]);
        let err = least_squares(&pts, 2).unwrap_err();
        assert!(format!("{err}").contains("needs at least 3 points"));

        let repeated = samples(&[(1.0, 1.0), (1.0, 2.0), (1.0, 3.0)]);
        let err = least_squares(&repeated, 2).unwrap_err();
        assert!(format!("{err}").contains("Normal equations are singular"));
    }
}
