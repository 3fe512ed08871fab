use super::state::AppState;
use crate::session::{SessionState, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/enable
/// Arm listening if the session is idle
pub async fn enable_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Enable requested for session: {}", state.session.session_id());
    control(&state, state.session.enable(), "enabled")
}

/// POST /session/disable
/// Cancel playback and stop listening
pub async fn disable_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Disable requested for session: {}", state.session.session_id());
    control(&state, state.session.disable(), "disabled")
}

fn control(state: &AppState, result: anyhow::Result<()>, status: &str) -> axum::response::Response {
    let session_id = state.session.session_id().to_string();

    match result {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ControlResponse {
                message: format!("Session {} {}", session_id, status),
                session_id,
                status: status.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Session control failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /session/status
/// Current state, counters and connection statistics
pub async fn get_session_status(State(state): State<AppState>) -> Json<SessionStats> {
    Json(state.session.stats())
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.state() {
        SessionState::Idle if state.session.stream().is_closed() => {
            (StatusCode::SERVICE_UNAVAILABLE, "STOPPED")
        }
        _ => (StatusCode::OK, "OK"),
    }
}
