use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the solvers.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Converts an `f64` constant into any scalar type.
///
/// Every `Scalar` in this crate (`f64`, `Dual`, `HyperDual`) converts losslessly,
/// so the fallback to NaN is never hit in practice.
pub fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// A first-order ODE system `dx/dt = f(t, x)`.
pub trait OdeSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current value of the control variable
    /// x: current state
    /// out: buffer to write dx/dt
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A square nonlinear system `F(x) = 0`.
pub trait Residual<T: Scalar> {
    fn dimension(&self) -> usize;

    fn residual(&self, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl OdeSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// A real function of one real variable.
pub trait UnivariateFunction {
    fn value(&self, x: f64) -> f64;

    /// First derivative. Closures fall back to a central difference.
    fn derivative(&self, x: f64) -> f64 {
        let h = 1e-6 * x.abs().max(1.0);
        (self.value(x + h) - self.value(x - h)) / (2.0 * h)
    }

    fn second_derivative(&self, x: f64) -> f64 {
        let h = 1e-4 * x.abs().max(1.0);
        (self.value(x + h) - 2.0 * self.value(x) + self.value(x - h)) / (h * h)
    }
}

impl<F> UnivariateFunction for F
where
    F: Fn(f64) -> f64,
{
    fn value(&self, x: f64) -> f64 {
        self(x)
    }
}
