//! Serializable problem definitions and their compiled forms.

use crate::equation_engine::{EquationSystem, Expression};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A real function of one named variable, e.g. `{"expression": "x^3 - 2*x - 5", "variable": "x"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub expression: String,
    pub variable: String,
}

impl FunctionDefinition {
    pub fn compile(&self) -> Result<Expression> {
        Expression::parse(&self.expression, &[self.variable.as_str()])
            .with_context(|| format!("Failed to compile function '{}'.", self.expression))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquationDefinition {
    pub expression: String,
    /// State variable whose derivative this equation defines.
    pub relative_to: String,
}

/// An ODE system `d(variables)/d(control_variable) = equations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdeDefinition {
    pub control_variable: String,
    pub variables: Vec<String>,
    pub equations: Vec<EquationDefinition>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

impl OdeDefinition {
    /// Orders the equations by `variables` and compiles them.
    pub fn compile(&self) -> Result<EquationSystem> {
        if self.variables.is_empty() {
            bail!("ODE definition has no variables.");
        }
        if self.equations.len() != self.variables.len() {
            bail!(
                "Expected one equation per variable ({}), got {}.",
                self.variables.len(),
                self.equations.len()
            );
        }

        let mut ordered = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let mut matching = self.equations.iter().filter(|eq| &eq.relative_to == var);
            let eq = match (matching.next(), matching.next()) {
                (Some(eq), None) => eq,
                (None, _) => bail!("No equation defined relative to '{}'.", var),
                (Some(_), Some(_)) => bail!("Multiple equations defined relative to '{}'.", var),
            };
            ordered.push(eq.expression.as_str());
        }

        let params: Vec<(&str, f64)> = self
            .parameters
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        let variables: Vec<&str> = self.variables.iter().map(String::as_str).collect();

        EquationSystem::ode(&self.control_variable, &variables, &ordered, &params)
            .context("Failed to compile ODE system.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{OdeSystem, UnivariateFunction};
    use approx::assert_abs_diff_eq;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn function_definition_compiles_from_json() {
        let def: FunctionDefinition =
            serde_json::from_str(r#"{"expression": "x**2 - 2", "variable": "x"}"#).unwrap();
        let f = def.compile().expect("function should compile");
        assert_abs_diff_eq!(f.value(3.0), 7.0);
        assert_abs_diff_eq!(f.derivative(3.0), 6.0);
    }

    #[test]
    fn function_definition_reports_unknown_names() {
        let def = FunctionDefinition {
            expression: "x + z".into(),
            variable: "x".into(),
        };
        assert_err_contains(def.compile(), "unknown variable or parameter: z");
    }

    #[test]
    fn ode_definition_orders_equations_by_variable() {
        let json = r#"{
            "control_variable": "t",
            "variables": ["y", "v"],
            "equations": [
                {"expression": "-k * y", "relative_to": "v"},
                {"expression": "v", "relative_to": "y"}
            ],
            "parameters": {"k": 4.0}
        }"#;
        let def: OdeDefinition = serde_json::from_str(json).unwrap();
        let system = def.compile().expect("system should compile");

        let mut out = [0.0; 2];
        system.apply(0.0, &[1.0, 2.0], &mut out);
        assert_eq!(out, [2.0, -4.0]);
    }

    #[test]
    fn ode_definition_requires_one_equation_per_variable() {
        let equation = |expression: &str, relative_to: &str| EquationDefinition {
            expression: expression.into(),
            relative_to: relative_to.into(),
        };
        let mut def = OdeDefinition {
            control_variable: "x".into(),
            variables: vec!["y".into(), "z".into()],
            equations: vec![equation("z", "y"), equation("y", "w")],
            parameters: BTreeMap::new(),
        };
        assert_err_contains(def.compile(), "No equation defined relative to 'z'");

        def.equations[1].relative_to = "y".into();
        assert_err_contains(def.compile(), "Multiple equations defined relative to 'y'");

        def.equations.pop();
        assert_err_contains(def.compile(), "Expected one equation per variable (2), got 1");
    }
}
