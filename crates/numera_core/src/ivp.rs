//! Fixed-step integration of initial-value problems.

use crate::autodiff::{Dual, HyperDual};
use crate::solvers::{
    Euler, Heun, ModifiedEuler, RungeKutta2, RungeKutta3, RungeKutta6, TaylorSeries, RK4,
};
use crate::traits::{OdeSystem, Steppable};
use anyhow::{anyhow, bail, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OdeMethod {
    #[serde(rename = "euler")]
    Euler,
    #[serde(rename = "modified_euler", alias = "euler_modificado")]
    ModifiedEuler,
    #[serde(rename = "heun")]
    Heun,
    #[serde(rename = "runge_kutta_2")]
    RungeKutta2,
    #[serde(rename = "runge_kutta_3")]
    RungeKutta3,
    #[serde(rename = "runge_kutta_4")]
    RungeKutta4,
    #[serde(rename = "runge_kutta_6")]
    RungeKutta6,
    #[serde(rename = "taylor_series", alias = "serie_taylor")]
    TaylorSeries,
}

impl OdeMethod {
    pub const ALL: [OdeMethod; 8] = [
        OdeMethod::Euler,
        OdeMethod::ModifiedEuler,
        OdeMethod::Heun,
        OdeMethod::RungeKutta2,
        OdeMethod::RungeKutta3,
        OdeMethod::RungeKutta4,
        OdeMethod::RungeKutta6,
        OdeMethod::TaylorSeries,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OdeMethod::Euler => "euler",
            OdeMethod::ModifiedEuler => "modified_euler",
            OdeMethod::Heun => "heun",
            OdeMethod::RungeKutta2 => "runge_kutta_2",
            OdeMethod::RungeKutta3 => "runge_kutta_3",
            OdeMethod::RungeKutta4 => "runge_kutta_4",
            OdeMethod::RungeKutta6 => "runge_kutta_6",
            OdeMethod::TaylorSeries => "taylor_series",
        }
    }
}

impl fmt::Display for OdeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OdeMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let method = match s.trim().to_ascii_lowercase().as_str() {
            "euler" => OdeMethod::Euler,
            "modified_euler" | "euler_modificado" | "midpoint" => OdeMethod::ModifiedEuler,
            "heun" => OdeMethod::Heun,
            "runge_kutta_2" | "rk2" => OdeMethod::RungeKutta2,
            "runge_kutta_3" | "rk3" => OdeMethod::RungeKutta3,
            "runge_kutta_4" | "rk4" => OdeMethod::RungeKutta4,
            "runge_kutta_6" | "rk6" => OdeMethod::RungeKutta6,
            "taylor_series" | "serie_taylor" | "taylor" => OdeMethod::TaylorSeries,
            other => return Err(anyhow!("Unknown ODE method '{}'.", other)),
        };
        Ok(method)
    }
}

/// How the integration interval is divided.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepControl {
    /// Step size; the last step is shortened to land on `t_end`.
    Size(f64),
    /// Number of equal steps.
    Points(usize),
}

/// A method's stepper with buffers sized for one system.
pub enum Stepper {
    Euler(Euler<f64>),
    ModifiedEuler(ModifiedEuler<f64>),
    Heun(Heun<f64>),
    RungeKutta2(RungeKutta2<f64>),
    RungeKutta3(RungeKutta3<f64>),
    RungeKutta4(RK4<f64>),
    RungeKutta6(RungeKutta6<f64>),
    TaylorSeries(TaylorSeries),
}

impl Stepper {
    pub fn new(method: OdeMethod, dim: usize) -> Self {
        match method {
            OdeMethod::Euler => Stepper::Euler(Euler::new(dim)),
            OdeMethod::ModifiedEuler => Stepper::ModifiedEuler(ModifiedEuler::new(dim)),
            OdeMethod::Heun => Stepper::Heun(Heun::new(dim)),
            OdeMethod::RungeKutta2 => Stepper::RungeKutta2(RungeKutta2::new(dim)),
            OdeMethod::RungeKutta3 => Stepper::RungeKutta3(RungeKutta3::new(dim)),
            OdeMethod::RungeKutta4 => Stepper::RungeKutta4(RK4::new(dim)),
            OdeMethod::RungeKutta6 => Stepper::RungeKutta6(RungeKutta6::new(dim)),
            OdeMethod::TaylorSeries => Stepper::TaylorSeries(TaylorSeries::new(dim)),
        }
    }

    pub fn step<S>(&mut self, system: &S, t: &mut f64, state: &mut [f64], dt: f64)
    where
        S: OdeSystem<f64> + OdeSystem<Dual> + OdeSystem<HyperDual>,
    {
        match self {
            Stepper::Euler(s) => s.step(system, t, state, dt),
            Stepper::ModifiedEuler(s) => s.step(system, t, state, dt),
            Stepper::Heun(s) => s.step(system, t, state, dt),
            Stepper::RungeKutta2(s) => s.step(system, t, state, dt),
            Stepper::RungeKutta3(s) => s.step(system, t, state, dt),
            Stepper::RungeKutta4(s) => s.step(system, t, state, dt),
            Stepper::RungeKutta6(s) => s.step(system, t, state, dt),
            Stepper::TaylorSeries(s) => s.step(system, t, state, dt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn final_state(&self) -> &[f64] {
        self.states.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values of one state variable along the trajectory.
    pub fn component(&self, index: usize) -> Vec<f64> {
        self.states.iter().map(|s| s[index]).collect()
    }
}

/// Upper bound on the steps of one trajectory.
pub const MAX_STEPS: usize = 10_000_000;

/// Number of steps and nominal step size covering `[t0, t_end]`.
fn plan_steps(t0: f64, t_end: f64, control: StepControl) -> Result<(usize, f64)> {
    if !(t0.is_finite() && t_end.is_finite()) {
        bail!("Integration bounds must be finite.");
    }
    if t_end <= t0 {
        bail!("t_end ({}) must be greater than t0 ({}).", t_end, t0);
    }
    let span = t_end - t0;
    let (count, h) = match control {
        StepControl::Points(0) => bail!("Number of steps must be greater than zero."),
        StepControl::Points(n) => (n as f64, span / n as f64),
        StepControl::Size(h) => {
            if !(h > 0.0) || !h.is_finite() {
                bail!("Step size must be positive, got {}.", h);
            }
            // Absorb round-off so 1.1 / 0.1 does not produce a vanishing extra step.
            ((span / h - 1e-9).ceil().max(1.0), h)
        }
    };
    if !(count <= MAX_STEPS as f64) {
        bail!(
            "Step count too large: {} steps requested, at most {} allowed.",
            count,
            MAX_STEPS
        );
    }
    Ok((count as usize, h))
}

/// Integrates `system` from `(t0, y0)` to `t_end` with a fixed-step method.
pub fn integrate<S>(
    system: &S,
    method: OdeMethod,
    t0: f64,
    y0: &[f64],
    t_end: f64,
    steps: StepControl,
) -> Result<Trajectory>
where
    S: OdeSystem<f64> + OdeSystem<Dual> + OdeSystem<HyperDual>,
{
    let dim = OdeSystem::<f64>::dimension(system);
    if y0.len() != dim {
        bail!(
            "Initial state dimension mismatch. Expected {}, got {}.",
            dim,
            y0.len()
        );
    }
    let (count, h) = plan_steps(t0, t_end, steps)?;

    let mut stepper = Stepper::new(method, dim);
    let mut times = Vec::with_capacity(count + 1);
    let mut states = Vec::with_capacity(count + 1);
    times.push(t0);
    states.push(y0.to_vec());

    let mut state = y0.to_vec();
    for k in 0..count {
        let mut t = t0 + k as f64 * h;
        let dt = if k + 1 == count { t_end - t } else { h };
        if k + 1 == count && (dt - h).abs() > 1e-9 * h {
            warn!("Final step shortened from {} to {} to end at {}.", h, dt, t_end);
        }

        stepper.step(system, &mut t, &mut state, dt);
        if state.iter().any(|v| !v.is_finite()) {
            bail!("{} produced a non-finite state at t = {}.", method, t);
        }

        let t = if k + 1 == count { t_end } else { t0 + (k + 1) as f64 * h };
        debug!("{} t = {}: {:?}", method, t, state);
        times.push(t);
        states.push(state.clone());
    }

    info!("{} integration finished: {} steps to t = {}.", method, count, t_end);
    Ok(Trajectory { times, states })
}

/// One method's trajectory scored against an analytical solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodComparison {
    pub method: OdeMethod,
    pub trajectory: Trajectory,
    /// `|numeric - analytical|` at every trajectory point.
    pub errors: Vec<f64>,
    pub max_error: f64,
}

#[allow(clippy::too_many_arguments)]
pub fn compare_methods<S, F>(
    system: &S,
    methods: &[OdeMethod],
    t0: f64,
    y0: &[f64],
    t_end: f64,
    steps: StepControl,
    component: usize,
    analytical: F,
) -> Result<Vec<MethodComparison>>
where
    S: OdeSystem<f64> + OdeSystem<Dual> + OdeSystem<HyperDual>,
    F: Fn(f64) -> f64,
{
    if component >= y0.len() {
        bail!(
            "Component {} is out of range for a {}-dimensional state.",
            component,
            y0.len()
        );
    }

    methods
        .iter()
        .map(|&method| {
            let trajectory = integrate(system, method, t0, y0, t_end, steps)?;
            let errors: Vec<f64> = trajectory
                .times
                .iter()
                .zip(&trajectory.states)
                .map(|(&t, state)| (state[component] - analytical(t)).abs())
                .collect();
            let max_error = errors.iter().cloned().fold(0.0, f64::max);
            info!("{}: max error {}", method, max_error);
            Ok(MethodComparison {
                method,
                trajectory,
                errors,
                max_error,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::EquationSystem;
    use approx::assert_abs_diff_eq;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn growth() -> EquationSystem {
        EquationSystem::ode("t", &["y"], &["y - t^2 + 1"], &[]).expect("system should compile")
    }

    fn growth_exact(t: f64) -> f64 {
        (t + 1.0).powi(2) - 0.5 * t.exp()
    }

    #[test]
    fn method_names_parse_and_serialize() {
        assert_eq!("euler_modificado".parse::<OdeMethod>().unwrap(), OdeMethod::ModifiedEuler);
        assert_eq!("serie_taylor".parse::<OdeMethod>().unwrap(), OdeMethod::TaylorSeries);
        assert_eq!("RK4".parse::<OdeMethod>().unwrap(), OdeMethod::RungeKutta4);
        assert!("adams".parse::<OdeMethod>().is_err());

        for method in OdeMethod::ALL {
            assert_eq!(method.name().parse::<OdeMethod>().unwrap(), method);
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.name()));
        }
        let alias: OdeMethod = serde_json::from_str("\"euler_modificado\"").unwrap();
        assert_eq!(alias, OdeMethod::ModifiedEuler);

        let control: StepControl = serde_json::from_str(r#"{"points": 10}"#).unwrap();
        assert_eq!(control, StepControl::Points(10));
    }

    #[test]
    fn trajectory_includes_endpoints() {
        let system = growth();
        let traj = integrate(&system, OdeMethod::Euler, 0.0, &[0.5], 2.0, StepControl::Points(4))
            .unwrap();
        assert_eq!(traj.len(), 5);
        assert_eq!(traj.times[0], 0.0);
        assert_eq!(traj.states[0], vec![0.5]);
        assert_eq!(*traj.times.last().unwrap(), 2.0);
        // Classic Euler table for this problem, h = 0.5.
        assert_abs_diff_eq!(traj.states[1][0], 1.25, epsilon = 1e-12);
        assert_abs_diff_eq!(traj.states[2][0], 2.25, epsilon = 1e-12);
    }

    #[test]
    fn step_size_shortens_final_step() {
        let system = growth();
        let traj = integrate(
            &system,
            OdeMethod::RungeKutta4,
            0.0,
            &[0.5],
            1.0,
            StepControl::Size(0.3),
        )
        .unwrap();
        assert_eq!(traj.len(), 5);
        assert_abs_diff_eq!(traj.times[3], 0.9, epsilon = 1e-12);
        assert_eq!(traj.times[4], 1.0);
        assert_abs_diff_eq!(traj.final_state()[0], growth_exact(1.0), epsilon = 5e-4);

        let even = integrate(&system, OdeMethod::Heun, 0.0, &[0.5], 1.1, StepControl::Size(0.1))
            .unwrap();
        assert_eq!(even.len(), 12);
    }

    #[test]
    fn oversized_step_counts_are_rejected() {
        let system = growth();
        assert_err_contains(
            integrate(&system, OdeMethod::Euler, 0.0, &[0.5], 1.0, StepControl::Size(1e-300)),
            "Step count too large",
        );
        assert_err_contains(
            integrate(&system, OdeMethod::Euler, 0.0, &[0.5], 1.0, StepControl::Points(usize::MAX)),
            "Step count too large",
        );
        assert_eq!(plan_steps(0.0, 1.0, StepControl::Points(MAX_STEPS)).unwrap().0, MAX_STEPS);
    }

    #[test]
    fn every_method_tracks_the_solution() {
        let system = growth();
        let results = compare_methods(
            &system,
            &OdeMethod::ALL,
            0.0,
            &[0.5],
            2.0,
            StepControl::Points(20),
            0,
            growth_exact,
        )
        .unwrap();
        assert_eq!(results.len(), OdeMethod::ALL.len());

        let error_of = |m: OdeMethod| {
            results
                .iter()
                .find(|r| r.method == m)
                .map(|r| r.max_error)
                .unwrap()
        };
        assert!(error_of(OdeMethod::Euler) < 0.5);
        assert!(error_of(OdeMethod::Heun) < error_of(OdeMethod::Euler));
        assert!(error_of(OdeMethod::RungeKutta4) < 1e-5);
        assert!(error_of(OdeMethod::RungeKutta6) < error_of(OdeMethod::RungeKutta4));
        assert!(error_of(OdeMethod::TaylorSeries) < 1e-3);
        for r in &results {
            assert_eq!(r.errors[0], 0.0);
            assert_eq!(r.errors.len(), r.trajectory.len());
        }
    }

    #[test]
    fn coupled_system_with_taylor_and_rk6() {
        let system = EquationSystem::ode("t", &["x", "v"], &["v", "-x"], &[]).unwrap();
        for method in [OdeMethod::TaylorSeries, OdeMethod::RungeKutta6] {
            let traj =
                integrate(&system, method, 0.0, &[1.0, 0.0], 1.0, StepControl::Points(200))
                    .unwrap();
            let end = traj.final_state();
            assert_abs_diff_eq!(end[0], 1f64.cos(), epsilon = 1e-6);
            assert_abs_diff_eq!(traj.component(1)[200], -(1f64.sin()), epsilon = 1e-6);
        }
    }

    #[test]
    fn validates_inputs() {
        let system = growth();
        assert_err_contains(
            integrate(&system, OdeMethod::Euler, 0.0, &[0.5, 1.0], 1.0, StepControl::Points(4)),
            "dimension mismatch",
        );
        assert_err_contains(
            integrate(&system, OdeMethod::Euler, 1.0, &[0.5], 0.0, StepControl::Points(4)),
            "must be greater than t0",
        );
        assert_err_contains(
            integrate(&system, OdeMethod::Euler, 0.0, &[0.5], 1.0, StepControl::Size(-0.1)),
            "Step size must be positive",
        );
        assert_err_contains(
            integrate(&system, OdeMethod::Euler, 0.0, &[0.5], 1.0, StepControl::Points(0)),
            "greater than zero",
        );
        assert_err_contains(
            compare_methods(
                &system,
                &[OdeMethod::Euler],
                0.0,
                &[0.5],
                1.0,
                StepControl::Points(4),
                3,
                |t| t,
            ),
            "out of range",
        );
    }
}
