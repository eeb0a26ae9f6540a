pub mod autodiff;
pub mod bvp;
pub mod definitions;
pub mod differentiation;
pub mod equation_engine;
pub mod fitting;
pub mod integration;
pub mod ivp;
pub mod linear;
pub mod nonlinear;
pub mod roots;
pub mod solvers;
/// The `numera_core` crate provides classical numerical methods on top of a small
/// compiled expression engine. Everything that evaluates a user function is generic
/// over `Scalar`, so the same expression runs on `f64`, `Dual` and `HyperDual`.
///
/// Key components:
/// - **Traits**: `Scalar`, `OdeSystem` (vector fields), `Residual` (`F(x) = 0`), `Steppable` (fixed-step solvers), `UnivariateFunction`.
/// - **Equation Engine**: Parser and bytecode VM for user-defined expressions and systems.
/// - **Roots / Nonlinear**: Bisection, false position, Newton-Raphson, secant; Newton for systems.
/// - **Linear**: Gauss elimination, LU (Doolittle), Jacobi.
/// - **Differentiation / Integration / Fitting**: Finite differences, Newton-Cotes rules, least squares.
/// - **Solvers / IVP / BVP**: Euler through RK6 and Taylor steppers, the integration driver, shooting and finite differences.
pub mod traits;
