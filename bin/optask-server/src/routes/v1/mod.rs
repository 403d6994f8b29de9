pub mod engines;
pub mod tasks;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::state::AppState;

/// Routes nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(tasks::router())
        .merge(engines::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct V1Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut doc = V1Api::openapi();
    doc.merge(tasks::TasksApi::openapi());
    doc.merge(engines::EnginesApi::openapi());
    doc
}
