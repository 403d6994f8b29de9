use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Restrict origins to `OPTASK_CORS_ORIGINS` when set; allow any otherwise.
pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let permissive = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    let Some(origins_str) = &state.config.cors_allowed_origins else {
        return permissive;
    };
    let origins: Vec<HeaderValue> = origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        permissive
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_headers(Any)
            .allow_methods(Any)
    }
}
