//! Two-point boundary-value problems: shooting and finite differences.

use crate::autodiff::{Dual, HyperDual};
use crate::equation_engine::{Expression, ScratchScalar};
use crate::ivp::{integrate, OdeMethod, StepControl, Trajectory};
use crate::nonlinear::{solve_newton, NewtonSettings};
use crate::traits::{lit, OdeSystem, Residual};
use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// An IVP with one unknown initial value, fixed by a condition at `t_end`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShootingProblem {
    pub t0: f64,
    pub t_end: f64,
    /// Known initial values; the entry at `unknown_index` is replaced by each guess.
    pub initial_state: Vec<f64>,
    pub unknown_index: usize,
    pub target_index: usize,
    pub target_value: f64,
    pub guesses: (f64, f64),
    pub method: OdeMethod,
    pub steps: StepControl,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ShootingSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ShootingSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShootingIteration {
    pub guess: f64,
    pub boundary_value: f64,
    pub residual: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShootingResult {
    pub guess: f64,
    pub trajectory: Trajectory,
    /// Secant updates performed.
    pub iterations: usize,
    pub history: Vec<ShootingIteration>,
}

/// Solves for the unknown initial value with a secant iteration on the
/// boundary residual `y_target(t_end) - target_value`.
pub fn shoot<S>(
    system: &S,
    problem: &ShootingProblem,
    settings: ShootingSettings,
) -> Result<ShootingResult>
where
    S: OdeSystem<f64> + OdeSystem<Dual> + OdeSystem<HyperDual>,
{
    let dim = OdeSystem::<f64>::dimension(system);
    if problem.initial_state.len() != dim {
        bail!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            dim,
            problem.initial_state.len()
        );
    }
    if problem.unknown_index >= dim || problem.target_index >= dim {
        bail!(
            "unknown_index ({}) and target_index ({}) must be below the dimension {}.",
            problem.unknown_index,
            problem.target_index,
            dim
        );
    }
    if !(settings.tolerance > 0.0) {
        bail!("tolerance must be positive.");
    }
    if settings.max_iterations == 0 {
        bail!("max_iterations must be greater than zero.");
    }

    let fire = |guess: f64| -> Result<(f64, Trajectory)> {
        let mut state = problem.initial_state.clone();
        state[problem.unknown_index] = guess;
        let trajectory = integrate(
            system,
            problem.method,
            problem.t0,
            &state,
            problem.t_end,
            problem.steps,
        )
        .with_context(|| format!("Integration failed for guess {}.", guess))?;
        let value = trajectory.final_state()[problem.target_index];
        debug!("Shooting guess {} reaches {}", guess, value);
        Ok((value, trajectory))
    };

    let mut history = Vec::new();

    let (mut g_prev, mut g_cur) = problem.guesses;
    let (mut b_prev, trajectory) = fire(g_prev)?;
    if record(&mut history, problem, g_prev, b_prev).abs() <= settings.tolerance {
        return Ok(ShootingResult {
            guess: g_prev,
            trajectory,
            iterations: 0,
            history,
        });
    }
    let (mut b_cur, mut trajectory) = fire(g_cur)?;
    let mut residual = record(&mut history, problem, g_cur, b_cur);

    for iteration in 1..=settings.max_iterations {
        if residual.abs() <= settings.tolerance {
            info!(
                "Shooting converged to initial value {} after {} iterations.",
                g_cur,
                iteration - 1
            );
            return Ok(ShootingResult {
                guess: g_cur,
                trajectory,
                iterations: iteration - 1,
                history,
            });
        }
        if b_cur == b_prev {
            bail!(
                "Guesses {} and {} reach the same boundary value {}.",
                g_prev,
                g_cur,
                b_cur
            );
        }

        let next = g_prev + (problem.target_value - b_prev) * (g_cur - g_prev) / (b_cur - b_prev);
        g_prev = g_cur;
        b_prev = b_cur;
        g_cur = next;
        (b_cur, trajectory) = fire(g_cur)?;
        residual = record(&mut history, problem, g_cur, b_cur);
    }

    if residual.abs() <= settings.tolerance {
        return Ok(ShootingResult {
            guess: g_cur,
            trajectory,
            iterations: settings.max_iterations,
            history,
        });
    }
    bail!(
        "Shooting failed to converge in {} iterations (residual {}).",
        settings.max_iterations,
        residual
    )
}

fn record(
    history: &mut Vec<ShootingIteration>,
    problem: &ShootingProblem,
    guess: f64,
    boundary_value: f64,
) -> f64 {
    let residual = boundary_value - problem.target_value;
    history.push(ShootingIteration {
        guess,
        boundary_value,
        residual,
    });
    residual
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiniteDifferenceSolution {
    /// Grid including both boundary nodes.
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Central-difference residual of `y'' = f(x, y, y')` at the interior nodes.
struct CollocationResidual<'a> {
    equation: &'a Expression,
    a: f64,
    h: f64,
    ya: f64,
    yb: f64,
    nodes: usize,
}

impl<T: ScratchScalar> Residual<T> for CollocationResidual<'_> {
    fn dimension(&self) -> usize {
        self.nodes
    }

    fn residual(&self, y: &[T], out: &mut [T]) {
        let h: T = lit(self.h);
        let h2 = h * h;
        let two: T = lit(2.0);
        let n = self.nodes;
        for i in 0..n {
            let left = if i == 0 { lit(self.ya) } else { y[i - 1] };
            let right = if i + 1 == n { lit(self.yb) } else { y[i + 1] };
            let x: T = lit(self.a + (i + 1) as f64 * self.h);
            let slope = (right - left) / (two * h);
            let rhs = self.equation.eval(&[x, y[i], slope]);
            out[i] = (left - two * y[i] + right) / h2 - rhs;
        }
    }
}

/// Solves `y'' = f(x, y, y')`, `y(a) = ya`, `y(b) = yb` on `nodes` interior
/// points with spacing `h = (b - a) / (nodes + 1)`.
///
/// `equation` is an expression over `[x, y, y']` in that order.
pub fn finite_difference(
    equation: &Expression,
    a: f64,
    b: f64,
    ya: f64,
    yb: f64,
    nodes: usize,
    settings: NewtonSettings,
) -> Result<FiniteDifferenceSolution> {
    if equation.variables().len() != 3 {
        bail!(
            "Equation must be written over [x, y, y'], got variables {:?}.",
            equation.variables()
        );
    }
    if nodes == 0 {
        bail!("At least one interior node is required.");
    }
    if !(a.is_finite() && b.is_finite()) || b <= a {
        bail!("Invalid interval [{}, {}].", a, b);
    }

    let h = (b - a) / (nodes + 1) as f64;
    let residual = CollocationResidual {
        equation,
        a,
        h,
        ya,
        yb,
        nodes,
    };
    // Straight line between the boundary values.
    let guess: Vec<f64> = (1..=nodes)
        .map(|i| ya + (yb - ya) * i as f64 / (nodes + 1) as f64)
        .collect();

    let solved = solve_newton(&residual, &guess, settings)
        .context("Finite-difference system did not converge.")?;
    info!(
        "Finite differences solved {} nodes in {} Newton steps.",
        nodes, solved.iterations
    );

    let xs: Vec<f64> = (0..nodes + 2).map(|i| a + i as f64 * h).collect();
    let mut ys = Vec::with_capacity(nodes + 2);
    ys.push(ya);
    ys.extend_from_slice(&solved.state);
    ys.push(yb);

    Ok(FiniteDifferenceSolution {
        xs,
        ys,
        iterations: solved.iterations,
        residual_norm: solved.residual_norm,
    })
}
