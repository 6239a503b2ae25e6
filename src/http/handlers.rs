use super::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health
/// Liveness probe: healthy only while the recognition backend is reachable,
/// so the orchestrator can restart us when connectivity is gone.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.backend.check_connectivity().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "backend": state.backend.name(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Health check failed, backend unreachable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("recognition backend unreachable: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.stats().await)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {session_id} not found"),
            }),
        )
            .into_response(),
    }
}

/// GET /sessions/:session_id/transcript
/// The aggregated transcript accumulated so far (read-only view).
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.snapshot())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {session_id} not found"),
            }),
        )
            .into_response(),
    }
}
