//! Solver engines.
//!
//! A [`SolverEngine`] is a synchronous, potentially very slow call.  Callers
//! must run it on a blocking thread (e.g. `tokio::task::spawn_blocking`);
//! engines expose no cancellation hook.

mod microlp;

pub use microlp::MicrolpEngine;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::problem::{Model, SolveOutcome};

/// An engine that can solve a validated [`Model`].
pub trait SolverEngine: Send + Sync + 'static {
    /// Identifier clients use to select this engine.
    fn name(&self) -> &str;

    /// Solve `model`, blocking the current thread until the engine returns.
    fn solve(&self, model: &Model) -> Result<SolveOutcome, EngineError>;
}

/// Engines available to the task service, keyed by name.
///
/// Engines must be registered before the registry is shared; afterwards
/// lookups are read-only.
#[derive(Clone)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn SolverEngine>>,
    default_engine: String,
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .field("default_engine", &self.default_engine)
            .finish()
    }
}

impl EngineRegistry {
    /// Create an empty registry whose default engine is `default_engine`.
    pub fn new(default_engine: impl Into<String>) -> Self {
        Self {
            engines: BTreeMap::new(),
            default_engine: default_engine.into(),
        }
    }

    /// Registry with every engine compiled into this crate.
    pub fn with_builtin(default_engine: impl Into<String>) -> Self {
        let mut registry = Self::new(default_engine);
        registry.register(MicrolpEngine);
        registry
    }

    /// Register (or replace) an engine under its own name.
    pub fn register(&mut self, engine: impl SolverEngine) {
        self.engines
            .insert(engine.name().to_owned(), Arc::new(engine));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SolverEngine>> {
        self.engines.get(name).cloned()
    }

    /// Resolve an optional client choice, falling back to the default engine.
    pub fn resolve(&self, choice: Option<&str>) -> Option<(String, Arc<dyn SolverEngine>)> {
        let name = choice.unwrap_or(&self.default_engine);
        self.get(name).map(|engine| (name.to_owned(), engine))
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }
}
