//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use lumen_core::config::ServerConfig;

use super::handlers;
use super::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    // Routes that do NOT require authentication.
    let public_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/v1/health", get(handlers::health));

    let protected_routes = Router::new()
        .route("/api/v1/images/process", post(handlers::process_image))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            super::auth::require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(server.body_limit_kb * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
