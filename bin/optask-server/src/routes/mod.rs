//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional OpenAPI document (disable with `OPTASK_ENABLE_OPENAPI=false`)
//! - Health / heartbeat route
//! - Task and engine routes under `/v1`

pub mod doc;
mod health;
mod v1;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router, middleware};

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .nest("/v1", v1::router());

    if state.config.enable_openapi {
        app = app.route(
            "/api-docs/openapi.json",
            get(|| async { Json(doc::get_docs()) }),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(cors::cors_layer(&state))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
