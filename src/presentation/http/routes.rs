//! Route Configuration
//!
//! Configures the websocket endpoint, probes, metrics and operator routes.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::admin_key_middleware;
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Push connections (`?token=<jwt>`)
        .route("/ws", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .nest("/admin", admin_routes(state.clone()))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// Operator routes (require `X-Admin-Key`)
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/cache", delete(handlers::admin::clear_cache))
        .route("/cache/stats", get(handlers::admin::cache_stats))
        .route("/cache/users/{user_id}", delete(handlers::admin::clear_user_cache))
        .route(
            "/conversations/{conversation_id}/invalidate",
            post(handlers::admin::invalidate_conversation),
        )
        .route("/presence/{user_id}", get(handlers::admin::presence))
        .route_layer(middleware::from_fn_with_state(state, admin_key_middleware))
}
