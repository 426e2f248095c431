//! API Routes
//!
//! Configures the Axum router with all endpoints.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, content_handler, delete_handler, get_handler, health_handler,
    invalidate_handler, set_handler, stats_handler, AppState,
};
use super::middleware::rate_limit_middleware;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - Rate limiting: every route, keyed by client address
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cache/:name", put(set_handler).delete(clear_handler))
        .route("/cache/:name/:key", get(get_handler).delete(delete_handler))
        .route("/cache/:name/invalidate/:tag", post(invalidate_handler))
        .route("/content/:slug", get(content_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
