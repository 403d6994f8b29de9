use thiserror::Error;

/// A submitted problem description is malformed.
///
/// Raised by [`crate::Model::build`] before any task is created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("problem must declare at least one variable")]
    NoVariables,

    #[error("objective has {actual} coefficients but the problem declares {expected} variables")]
    ObjectiveArity { expected: usize, actual: usize },

    #[error("constraint {index} has {actual} coefficients but the problem declares {expected} variables")]
    ConstraintArity {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{location} contains a non-finite number")]
    NonFinite { location: String },
}

/// The solver engine failed to produce an outcome.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine ran but reported a failure it could not classify.
    #[error("solver failure: {0}")]
    Solver(String),

    /// The engine returned values that could not be turned into an outcome.
    #[error("solver returned an unusable solution: {0}")]
    InvalidSolution(String),
}
