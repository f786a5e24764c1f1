use super::handlers::{self, AppState};
use super::metrics_handler::{metrics_handler, track_requests};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the Axum router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Cache admin endpoints
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/invalidate", post(handlers::cache_invalidate))
        .route("/cache/clear", post(handlers::cache_clear))
        // Caching proxy in front of the upstream API
        .route("/cache/call/{operation}", post(handlers::cache_call))
        // Prometheus
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_requests))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
