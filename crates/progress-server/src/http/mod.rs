//! HTTP server for the progress tracker.
//!
//! Provides endpoints for:
//! - Progress ingress from remote services (`/progress/update`)
//! - Run views, timelines and live streams (`/progress/...`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod correlation;
mod handlers;
pub mod responses;

pub use correlation::propagate_correlation_id;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for dashboard access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Ingress
        .route("/progress/update", post(handlers::receive_update))
        // Query routes
        .route("/progress", get(handlers::list_views))
        .route("/progress/stats", get(handlers::get_stats))
        .route(
            "/progress/:correlation_id",
            get(handlers::get_view).delete(handlers::evict_run),
        )
        .route("/progress/:correlation_id/events", get(handlers::get_events))
        .route("/progress/:correlation_id/stream", get(handlers::stream_events))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(middleware::from_fn(propagate_correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
