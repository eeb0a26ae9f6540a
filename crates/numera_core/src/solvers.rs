use crate::autodiff::{Dual, HyperDual};
use crate::traits::{lit, OdeSystem, Scalar, Steppable};

fn zeros<T: Scalar>(dim: usize) -> Vec<T> {
    vec![T::zero(); dim]
}

/// Explicit Euler: `y + h f(t, y)`.
pub struct Euler<T: Scalar> {
    k1: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Self {
        Self { k1: zeros(dim) }
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(*t, state, &mut self.k1);
        for i in 0..state.len() {
            state[i] = state[i] + dt * self.k1[i];
        }
        *t = *t + dt;
    }
}

/// Heun: Euler predictor, trapezoidal corrector.
pub struct Heun<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Heun<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: zeros(dim),
            k2: zeros(dim),
            tmp: zeros(dim),
        }
    }
}

impl<T: Scalar> Steppable<T> for Heun<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half: T = lit(0.5);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            state[i] = state[i] + dt * half * (self.k1[i] + self.k2[i]);
        }
        *t = t0 + dt;
    }
}

/// Modified Euler (midpoint): slope taken half a step ahead.
pub struct ModifiedEuler<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> ModifiedEuler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: zeros(dim),
            k2: zeros(dim),
            tmp: zeros(dim),
        }
    }
}

impl<T: Scalar> Steppable<T> for ModifiedEuler<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half: T = lit(0.5);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * half * self.k1[i];
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            state[i] = state[i] + dt * self.k2[i];
        }
        *t = t0 + dt;
    }
}

/// Second-order Runge-Kutta, Ralston weights (node at 3/4).
pub struct RungeKutta2<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RungeKutta2<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: zeros(dim),
            k2: zeros(dim),
            tmp: zeros(dim),
        }
    }
}

impl<T: Scalar> Steppable<T> for RungeKutta2<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let c2: T = lit(0.75);
        let b1: T = lit(1.0 / 3.0);
        let b2: T = lit(2.0 / 3.0);
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * c2 * self.k1[i];
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            state[i] = state[i] + dt * (b1 * self.k1[i] + b2 * self.k2[i]);
        }
        *t = t0 + dt;
    }
}

/// Kutta's third-order method.
pub struct RungeKutta3<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RungeKutta3<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: zeros(dim),
            k2: zeros(dim),
            k3: zeros(dim),
            tmp: zeros(dim),
        }
    }
}

impl<T: Scalar> Steppable<T> for RungeKutta3<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half: T = lit(0.5);
        let two: T = lit(2.0);
        let four: T = lit(4.0);
        let sixth: T = lit(1.0 / 6.0);
        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * half * self.k1[i];
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt, y - dt*k1 + 2*dt*k2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (two * self.k2[i] - self.k1[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            state[i] = state[i] + dt * sixth * (self.k1[i] + four * self.k2[i] + self.k3[i]);
        }
        *t = t0 + dt;
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: zeros(dim),
            k2: zeros(dim),
            k3: zeros(dim),
            k4: zeros(dim),
            tmp: zeros(dim),
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half: T = lit(0.5);
        let sixth: T = lit(1.0 / 6.0);
        let two: T = lit(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

/// Butcher's six-stage Runge-Kutta method.
pub struct RungeKutta6<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RungeKutta6<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: zeros(dim),
            k2: zeros(dim),
            k3: zeros(dim),
            k4: zeros(dim),
            k5: zeros(dim),
            k6: zeros(dim),
            tmp: zeros(dim),
        }
    }
}

impl<T: Scalar> Steppable<T> for RungeKutta6<T> {
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;

        let c2: T = lit(0.25);
        let c4: T = lit(0.5);
        let c5: T = lit(0.75);

        let a21: T = lit(0.25);
        let a31: T = lit(0.125);
        let a32: T = lit(0.125);
        let a42: T = lit(-0.5);
        let a51: T = lit(3.0 / 16.0);
        let a54: T = lit(9.0 / 16.0);
        let a61: T = lit(-3.0 / 7.0);
        let a62: T = lit(2.0 / 7.0);
        let a63: T = lit(12.0 / 7.0);
        let a64: T = lit(-12.0 / 7.0);
        let a65: T = lit(8.0 / 7.0);

        let b1: T = lit(7.0 / 90.0);
        let b3: T = lit(32.0 / 90.0);
        let b4: T = lit(12.0 / 90.0);
        let b5: T = lit(32.0 / 90.0);
        let b6: T = lit(7.0 / 90.0);

        // k1
        system.apply(t0, state, &mut self.k1);

        // k2
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2);

        // k3 shares the k2 node
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k3);

        // k4
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a42 * self.k2[i] + self.k3[i]);
        }
        system.apply(t0 + c4 * dt, &self.tmp, &mut self.k4);

        // k5
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a51 * self.k1[i] + a54 * self.k4[i]);
        }
        system.apply(t0 + c5 * dt, &self.tmp, &mut self.k5);

        // k6
        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k6);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }

        *t = t0 + dt;
    }
}

/// Third-order Taylor series method.
///
/// The higher derivatives of the solution come from differentiating the
/// vector field along `(1, f)`:
/// - `y''  = f_t + J f` (first-order part of a hyper-dual sweep),
/// - `y''' = D²f[(1, f), (1, f)] + J y''` (mixed part of the same sweep plus
///   one dual sweep along `(0, y'')`).
///
/// Only `f64` states are supported since the system is re-evaluated over
/// `Dual` and `HyperDual`.
pub struct TaylorSeries {
    f: Vec<f64>,
    y2: Vec<f64>,
    hyper_state: Vec<HyperDual>,
    hyper_out: Vec<HyperDual>,
    dual_state: Vec<Dual>,
    dual_out: Vec<Dual>,
}

impl TaylorSeries {
    pub fn new(dim: usize) -> Self {
        Self {
            f: vec![0.0; dim],
            y2: vec![0.0; dim],
            hyper_state: vec![HyperDual::constant(0.0); dim],
            hyper_out: vec![HyperDual::constant(0.0); dim],
            dual_state: vec![Dual::constant(0.0); dim],
            dual_out: vec![Dual::constant(0.0); dim],
        }
    }

    pub fn step<S>(&mut self, system: &S, t: &mut f64, state: &mut [f64], dt: f64)
    where
        S: OdeSystem<f64> + OdeSystem<Dual> + OdeSystem<HyperDual> + ?Sized,
    {
        let t0 = *t;
        let n = state.len();

        OdeSystem::<f64>::apply(system, t0, state, &mut self.f);

        for i in 0..n {
            self.hyper_state[i] = HyperDual::seeded(state[i], self.f[i]);
        }
        OdeSystem::<HyperDual>::apply(
            system,
            HyperDual::seeded(t0, 1.0),
            &self.hyper_state,
            &mut self.hyper_out,
        );
        for i in 0..n {
            self.y2[i] = self.hyper_out[i].e1;
        }

        for i in 0..n {
            self.dual_state[i] = Dual::new(state[i], self.y2[i]);
        }
        OdeSystem::<Dual>::apply(
            system,
            Dual::constant(t0),
            &self.dual_state,
            &mut self.dual_out,
        );

        let h2 = dt * dt / 2.0;
        let h3 = dt * dt * dt / 6.0;
        for i in 0..n {
            let y3 = self.hyper_out[i].e12 + self.dual_out[i].eps;
            state[i] += dt * self.f[i] + h2 * self.y2[i] + h3 * y3;
        }

        *t = t0 + dt;
    }
}
