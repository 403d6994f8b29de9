//! In-process LP/MILP engine backed by `good_lp`'s pure-Rust microlp solver.

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    microlp, variable,
};
use tracing::debug;

use super::SolverEngine;
use crate::error::EngineError;
use crate::problem::{
    ConstraintReport, ConstraintSense, Model, ObjectiveSense, SolveOutcome, TerminationKind,
    VariableDomain,
};

/// Branch-and-bound simplex solver that needs no system libraries.
///
/// Dual values are not exposed by this backend, so sensitivity reports carry
/// activities and slacks only.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpEngine;

impl MicrolpEngine {
    pub const NAME: &'static str = "microlp";
}

fn linear(coefficients: &[f64], vars: &[Variable]) -> Expression {
    coefficients
        .iter()
        .zip(vars)
        .map(|(c, x)| *c * *x)
        .sum()
}

impl SolverEngine for MicrolpEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn solve(&self, model: &Model) -> Result<SolveOutcome, EngineError> {
        let problem = model.problem();
        debug!(
            variables = problem.variable_count(),
            constraints = problem.constraints.len(),
            sense = %problem.objective.sense,
            "solving with microlp"
        );

        let mut vars = ProblemVariables::new();
        let xs: Vec<Variable> = problem
            .variable_domains
            .iter()
            .map(|domain| {
                let definition = match domain {
                    VariableDomain::NonNegativeReals => variable().min(0.0),
                    VariableDomain::NonNegativeIntegers => variable().integer().min(0.0),
                    VariableDomain::Integers => variable().integer(),
                    VariableDomain::Reals => variable(),
                    VariableDomain::Binary => variable().binary(),
                };
                vars.add(definition)
            })
            .collect();

        let objective = linear(&problem.objective.coefficients, &xs);
        let unsolved = match problem.objective.sense {
            ObjectiveSense::Maximize => vars.maximise(objective),
            ObjectiveSense::Minimize => vars.minimise(objective),
        };

        let mut lp = unsolved.using(microlp);
        for c in &problem.constraints {
            let lhs = linear(&c.coefficients, &xs);
            lp = lp.with(match c.sense {
                ConstraintSense::LessOrEqual => constraint::leq(lhs, c.rhs),
                ConstraintSense::GreaterOrEqual => constraint::geq(lhs, c.rhs),
                ConstraintSense::Equal => constraint::eq(lhs, c.rhs),
            });
        }

        let solution = match lp.solve() {
            Ok(solution) => solution,
            Err(ResolutionError::Infeasible) => return Ok(SolveOutcome::infeasible()),
            Err(ResolutionError::Unbounded) => return Ok(SolveOutcome::unbounded()),
            Err(e) => return Err(EngineError::Solver(e.to_string())),
        };

        let values: Vec<f64> = xs
            .iter()
            .zip(&problem.variable_domains)
            .map(|(x, domain)| {
                let v = solution.value(*x);
                if domain.is_integer() { v.round() } else { v }
            })
            .collect();
        if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::InvalidSolution(format!(
                "variable {bad} has a non-finite value"
            )));
        }

        let objective_value: f64 = problem
            .objective
            .coefficients
            .iter()
            .zip(&values)
            .map(|(c, v)| c * v)
            .sum();
        let sensitivity = problem
            .constraints
            .iter()
            .enumerate()
            .map(|(i, c)| ConstraintReport::evaluate(i, c, &values))
            .collect();

        Ok(SolveOutcome {
            termination_kind: TerminationKind::Optimal,
            message: "an optimal solution was found".to_owned(),
            objective_value: Some(objective_value),
            variable_values: Some(values),
            sensitivity: Some(sensitivity),
        })
    }
}
