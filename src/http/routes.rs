use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Liveness probe
        .route("/health", get(handlers::health_check))
        // Realtime streaming recognition
        .route("/ws/realtime", get(ws::realtime_ws))
        // Session queries
        .route(
            "/sessions/:session_id/status",
            get(handlers::get_session_status),
        )
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::get_session_transcript),
        )
        // Browser clients connect from arbitrary origins
        .layer(CorsLayer::permissive())
        // Tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
