use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::schemas::v1::engine::EnginesResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_engines), components(schemas(EnginesResponse)))]
pub struct EnginesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/engines", get(list_engines))
}

/// Solver engines this server can run.
#[utoipa::path(
    get,
    path = "/v1/engines",
    tag = "engines",
    responses(
        (status = 200, description = "Engine catalogue", body = EnginesResponse),
    )
)]
pub async fn list_engines(State(state): State<Arc<AppState>>) -> Json<EnginesResponse> {
    let engines = state.runner.engines();
    Json(EnginesResponse {
        engines: engines.names(),
        default_engine: engines.default_engine().to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn lists_registered_engines() {
        let (state, _) = test_support::app_state(1).await;
        let Json(body) = list_engines(State(state)).await;
        assert!(body.engines.iter().any(|e| e == "microlp"));
        assert_eq!(body.default_engine, "microlp");
    }
}
