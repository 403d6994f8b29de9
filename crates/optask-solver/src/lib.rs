//! Problem description, model building and solver engines for optask.
//!
//! The task service treats solving as an opaque, blocking call: it builds a
//! [`Model`] from a submitted [`Problem`], resolves a [`SolverEngine`] from
//! the [`EngineRegistry`], and calls [`SolverEngine::solve`] on a worker
//! thread.  Nothing in this crate knows about tasks, storage or HTTP.

pub mod engine;
pub mod problem;

mod error;

pub use engine::{EngineRegistry, MicrolpEngine, SolverEngine};
pub use error::{EngineError, ValidationError};
pub use problem::{
    Constraint, ConstraintReport, ConstraintSense, Model, Objective, ObjectiveSense, Problem,
    SolveOutcome, TerminationKind, VariableDomain,
};
