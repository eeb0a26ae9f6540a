//! Direct and iterative solvers for dense linear systems `A x = b`.

use anyhow::{bail, Result};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    #[error("matrix has no rows")]
    Empty,
    #[error("row {row} has {got} entries, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("matrix is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },
    #[error("right-hand side has {got} entries, expected {expected}")]
    RhsMismatch { expected: usize, got: usize },
    #[error("initial guess has {got} entries, expected {expected}")]
    GuessMismatch { expected: usize, got: usize },
}

/// Builds a square matrix from rows, validating the shape.
pub fn square_matrix(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, MatrixError> {
    let n = rows.len();
    if n == 0 {
        return Err(MatrixError::Empty);
    }
    let cols = rows[0].len();
    for (row, values) in rows.iter().enumerate() {
        if values.len() != cols {
            return Err(MatrixError::Ragged {
                row,
                expected: cols,
                got: values.len(),
            });
        }
    }
    if cols != n {
        return Err(MatrixError::NotSquare { rows: n, cols });
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

impl LinearSystem {
    pub fn from_rows(rows: &[Vec<f64>], rhs: &[f64]) -> Result<Self, MatrixError> {
        let matrix = square_matrix(rows)?;
        if rhs.len() != matrix.nrows() {
            return Err(MatrixError::RhsMismatch {
                expected: matrix.nrows(),
                got: rhs.len(),
            });
        }
        Ok(Self {
            matrix,
            rhs: DVector::from_column_slice(rhs),
        })
    }

    pub fn dimension(&self) -> usize {
        self.rhs.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pivoting {
    /// Eliminate in the given row order.
    None,
    /// Swap in the row with the largest pivot magnitude.
    #[default]
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaussSolution {
    /// Upper-triangular matrix after elimination.
    pub upper: DMatrix<f64>,
    /// Right-hand side after the same row operations.
    pub rhs: DVector<f64>,
    pub solution: DVector<f64>,
}

pub fn gauss_elimination(system: &LinearSystem, pivoting: Pivoting) -> Result<GaussSolution> {
    let n = system.dimension();
    let mut a = system.matrix.clone();
    let mut b = system.rhs.clone();

    for k in 0..n {
        if pivoting == Pivoting::Partial {
            let mut p = k;
            for i in k + 1..n {
                if a[(i, k)].abs() > a[(p, k)].abs() {
                    p = i;
                }
            }
            if p != k {
                a.swap_rows(k, p);
                b.swap_rows(k, p);
                debug!("Gauss elimination: swapped rows {} and {}", k, p);
            }
        }

        let pivot = a[(k, k)];
        if pivot == 0.0 {
            bail!("Zero pivot in column {} during Gauss elimination.", k);
        }
        for i in k + 1..n {
            let factor = a[(i, k)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in k..n {
                a[(i, j)] -= factor * a[(k, j)];
            }
            a[(i, k)] = 0.0;
            b[i] -= factor * b[k];
        }
        debug!("Gauss elimination after column {}: {}", k, a);
    }

    let solution = back_substitution(&a, &b)?;
    Ok(GaussSolution {
        upper: a,
        rhs: b,
        solution,
    })
}

fn check_triangular(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<()> {
    if matrix.nrows() == 0 {
        bail!(MatrixError::Empty);
    }
    if !matrix.is_square() {
        bail!(MatrixError::NotSquare {
            rows: matrix.nrows(),
            cols: matrix.ncols()
        });
    }
    if rhs.len() != matrix.nrows() {
        bail!(MatrixError::RhsMismatch {
            expected: matrix.nrows(),
            got: rhs.len()
        });
    }
    Ok(())
}

/// Solves `U x = b` for upper-triangular `U`; entries below the diagonal are ignored.
pub fn back_substitution(upper: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
    check_triangular(upper, rhs)?;
    let n = rhs.len();
    let mut x = DVector::zeros(n);
    for i in (0..n).rev() {
        let diag = upper[(i, i)];
        if diag == 0.0 {
            bail!("Zero pivot in row {} during back substitution.", i);
        }
        let sum: f64 = (i + 1..n).map(|j| upper[(i, j)] * x[j]).sum();
        x[i] = (rhs[i] - sum) / diag;
    }
    Ok(x)
}

/// Solves `L y = b` for lower-triangular `L` with an implied unit diagonal.
pub fn forward_substitution(unit_lower: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
    check_triangular(unit_lower, rhs)?;
    let n = rhs.len();
    let mut y = DVector::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| unit_lower[(i, j)] * y[j]).sum();
        y[i] = rhs[i] - sum;
    }
    Ok(y)
}

/// Doolittle factorization `A = L U` with a unit diagonal on `L`.
#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    pub lower: DMatrix<f64>,
    pub upper: DMatrix<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LuSolution {
    /// `y` from `L y = b`.
    pub intermediate: DVector<f64>,
    pub solution: DVector<f64>,
}

pub fn lu_decompose(matrix: &DMatrix<f64>) -> Result<LuDecomposition> {
    let n = matrix.nrows();
    if n == 0 {
        bail!(MatrixError::Empty);
    }
    if matrix.ncols() != n {
        bail!(MatrixError::NotSquare {
            rows: n,
            cols: matrix.ncols()
        });
    }

    let mut lower = DMatrix::identity(n, n);
    let mut upper = DMatrix::zeros(n, n);
    for i in 0..n {
        for k in i..n {
            let sum: f64 = (0..i).map(|j| lower[(i, j)] * upper[(j, k)]).sum();
            upper[(i, k)] = matrix[(i, k)] - sum;
        }
        let pivot = upper[(i, i)];
        if pivot == 0.0 {
            bail!("Zero pivot at row {} during LU decomposition.", i);
        }
        for k in i + 1..n {
            let sum: f64 = (0..i).map(|j| lower[(k, j)] * upper[(j, i)]).sum();
            lower[(k, i)] = (matrix[(k, i)] - sum) / pivot;
        }
    }
    debug!("LU decomposition: L = {}, U = {}", lower, upper);

    Ok(LuDecomposition { lower, upper })
}

impl LuDecomposition {
    pub fn solve(&self, rhs: &[f64]) -> Result<LuSolution> {
        let n = self.upper.nrows();
        if rhs.len() != n {
            bail!(MatrixError::RhsMismatch {
                expected: n,
                got: rhs.len()
            });
        }
        let b = DVector::from_column_slice(rhs);
        let intermediate = forward_substitution(&self.lower, &b)?;
        let solution = back_substitution(&self.upper, &intermediate)?;
        Ok(LuSolution {
            intermediate,
            solution,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct JacobiSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for JacobiSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 9999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JacobiIteration {
    pub iteration: usize,
    pub solution: Vec<f64>,
    pub absolute_variation: f64,
    pub relative_variation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JacobiResult {
    pub solution: Vec<f64>,
    pub iterations: usize,
    pub history: Vec<JacobiIteration>,
}

/// Strict row diagonal dominance.
pub fn is_diagonally_dominant(matrix: &DMatrix<f64>) -> bool {
    (0..matrix.nrows()).all(|i| {
        let off: f64 = (0..matrix.ncols())
            .filter(|&j| j != i)
            .map(|j| matrix[(i, j)].abs())
            .sum();
        matrix[(i, i)].abs() > off
    })
}

pub fn jacobi(
    system: &LinearSystem,
    initial: &[f64],
    settings: JacobiSettings,
) -> Result<JacobiResult> {
    let n = system.dimension();
    if initial.len() != n {
        bail!(MatrixError::GuessMismatch {
            expected: n,
            got: initial.len()
        });
    }
    if !(settings.tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }
    if settings.max_iterations == 0 {
        bail!("max_iterations must be greater than zero.");
    }
    let a = &system.matrix;
    if let Some(i) = (0..n).find(|&i| a[(i, i)] == 0.0) {
        bail!("Zero diagonal entry in row {}; Jacobi iteration is undefined.", i);
    }
    if !is_diagonally_dominant(a) {
        warn!("Matrix is not diagonally dominant; Jacobi iteration may diverge.");
    }

    let mut x = initial.to_vec();
    let mut next = vec![0.0; n];
    let mut history = Vec::new();

    for iteration in 1..=settings.max_iterations {
        for i in 0..n {
            let off: f64 = (0..n).filter(|&j| j != i).map(|j| a[(i, j)] * x[j]).sum();
            next[i] = (system.rhs[i] - off) / a[(i, i)];
        }

        let mut absolute_variation = 0.0f64;
        let mut relative_variation = 0.0f64;
        for i in 0..n {
            let delta = (next[i] - x[i]).abs();
            absolute_variation = absolute_variation.max(delta);
            if next[i] != 0.0 {
                relative_variation = relative_variation.max(delta / next[i].abs());
            }
        }
        if !absolute_variation.is_finite() {
            bail!("Jacobi iteration diverged at iteration {}.", iteration);
        }

        std::mem::swap(&mut x, &mut next);
        debug!(
            "Jacobi iteration {}: x = {:?}, abs = {}, rel = {}",
            iteration, x, absolute_variation, relative_variation
        );
        history.push(JacobiIteration {
            iteration,
            solution: x.clone(),
            absolute_variation,
            relative_variation,
        });

        if absolute_variation <= settings.tolerance && relative_variation <= settings.tolerance {
            info!("Jacobi iteration converged after {} iterations.", iteration);
            return Ok(JacobiResult {
                solution: x,
                iterations: iteration,
                history,
            });
        }
    }

    bail!(
        "Jacobi iteration failed to converge in {} iterations.",
        settings.max_iterations
    )
}
