//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::runtime::{ProgressPublisher, TaskRunner};

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Durable task records; the only state shared with background runners.
    pub store: Arc<SqliteStore>,
    /// Accepts submissions and drives solves; also owns the engine registry.
    pub runner: TaskRunner,
    pub publisher: ProgressPublisher,
}
