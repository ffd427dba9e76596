//! Route table for the gateway, matching the original's endpoint shapes.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/build", post(handlers::build))
        .route("/build_advanced", post(handlers::build_advanced))
        .route("/{build_id}/dockerfile", get(handlers::get_dockerfile))
        .route("/{build_id}/status", get(handlers::get_status))
        .route("/{build_id}/build_log", get(handlers::get_build_log))
        .route("/{build_id}/docker", get(handlers::get_docker))
        .route("/{build_id}/singularity", get(handlers::get_singularity))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
