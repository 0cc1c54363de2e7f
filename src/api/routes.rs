//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        .route(
            "/api/proxy",
            get(handlers::browse::browse_get).post(handlers::browse::browse),
        )
        .route("/api/proxies", get(handlers::proxies::list_proxies))
        .with_state(state)
}
