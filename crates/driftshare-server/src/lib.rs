//! HTTP front for the share registry.

pub mod config;
pub mod routes;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::AppState;

/// Build the router. Kept separate from `main` so tests can drive it with
/// `oneshot`.
pub fn app(state: AppState) -> Router {
    // CORS: permissive, share links are opened from any origin
    Router::new()
        .route("/api/share", post(routes::create_share).get(routes::resolve_share))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
