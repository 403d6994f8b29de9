//! Problem description types and the [`Model`] builder.
//!
//! The JSON field names and enumeration spellings are the wire format used
//! by clients (`variable_domains`, `"NonNegativeReals"`, `"<="`, ...), so the
//! serde attributes here must not change without a client migration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::ValidationError;

/// Domain of a single decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum VariableDomain {
    /// Continuous, `x >= 0`.
    NonNegativeReals,
    /// Integer, `x >= 0`.
    NonNegativeIntegers,
    /// Integer, unbounded.
    Integers,
    /// Continuous, unbounded.
    Reals,
    /// `x ∈ {0, 1}`.
    Binary,
}

impl VariableDomain {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            VariableDomain::NonNegativeIntegers | VariableDomain::Integers | VariableDomain::Binary
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObjectiveSense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ConstraintSense {
    #[serde(rename = "<=")]
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[serde(rename = ">=")]
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[serde(rename = "=")]
    #[strum(serialize = "=")]
    Equal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub coefficients: Vec<f64>,
    pub sense: ObjectiveSense,
}

/// One linear constraint `coefficients · x (sense) rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub coefficients: Vec<f64>,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

/// A linear or mixed-integer program as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub variable_domains: Vec<VariableDomain>,
    pub objective: Objective,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Problem {
    pub fn variable_count(&self) -> usize {
        self.variable_domains.len()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let expected = self.variable_count();
        if expected == 0 {
            return Err(ValidationError::NoVariables);
        }

        if self.objective.coefficients.len() != expected {
            return Err(ValidationError::ObjectiveArity {
                expected,
                actual: self.objective.coefficients.len(),
            });
        }
        if self.objective.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ValidationError::NonFinite {
                location: "objective".to_owned(),
            });
        }

        for (i, constraint) in self.constraints.iter().enumerate() {
            let index = i + 1;
            if constraint.coefficients.len() != expected {
                return Err(ValidationError::ConstraintArity {
                    index,
                    expected,
                    actual: constraint.coefficients.len(),
                });
            }
            if !constraint.rhs.is_finite() || constraint.coefficients.iter().any(|c| !c.is_finite())
            {
                return Err(ValidationError::NonFinite {
                    location: format!("constraint {index}"),
                });
            }
        }
        Ok(())
    }
}

/// A validated problem, ready to be handed to a [`crate::SolverEngine`].
///
/// Cloning is cheap; the problem is shared behind an `Arc` so a model can be
/// moved onto a blocking worker thread without copying coefficient vectors.
#[derive(Debug, Clone)]
pub struct Model {
    problem: Arc<Problem>,
}

impl Model {
    /// Validate `problem` and wrap it as a solvable model.
    pub fn build(problem: Problem) -> Result<Self, ValidationError> {
        problem.validate()?;
        Ok(Self {
            problem: Arc::new(problem),
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }
}

/// How the engine's search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TerminationKind {
    Optimal,
    Infeasible,
    Unbounded,
    Other,
}

/// Activity and slack of one constraint at the reported solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintReport {
    pub name: String,
    /// Value of the constraint's left-hand side.
    pub value: f64,
    /// Distance to the lower bound; `None` when there is no lower bound.
    pub lslack: Option<f64>,
    /// Distance to the upper bound; `None` when there is no upper bound.
    pub uslack: Option<f64>,
    /// Dual value, when the engine exposes one.
    pub dual: Option<f64>,
}

impl ConstraintReport {
    pub fn evaluate(index: usize, constraint: &Constraint, values: &[f64]) -> Self {
        let value: f64 = constraint
            .coefficients
            .iter()
            .zip(values)
            .map(|(c, x)| c * x)
            .sum();
        let (lslack, uslack) = match constraint.sense {
            ConstraintSense::LessOrEqual => (None, Some(constraint.rhs - value)),
            ConstraintSense::GreaterOrEqual => (Some(value - constraint.rhs), None),
            ConstraintSense::Equal => (Some(value - constraint.rhs), Some(constraint.rhs - value)),
        };
        Self {
            name: format!("constraint {}", index + 1),
            value,
            lslack,
            uslack,
            dual: None,
        }
    }
}

/// Structured result of one solve invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveOutcome {
    pub termination_kind: TerminationKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Vec<ConstraintReport>>,
}

impl SolveOutcome {
    pub fn infeasible() -> Self {
        Self {
            termination_kind: TerminationKind::Infeasible,
            message: "the problem has no solution that satisfies every constraint".to_owned(),
            objective_value: None,
            variable_values: None,
            sensitivity: None,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            termination_kind: TerminationKind::Unbounded,
            message: "the objective can be improved without bound".to_owned(),
            objective_value: None,
            variable_values: None,
            sensitivity: None,
        }
    }
}
