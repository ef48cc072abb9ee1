//! HTTP request handlers

use crate::api::AppState;
use crate::session::{SessionSummary, StatusReport};
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStartedResponse {
    session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    bytes: usize,
    records_enqueued: usize,
    queue_size: usize,
}

type ErrorResponse = (StatusCode, Json<StatusResponse>);

fn conflict(message: String) -> ErrorResponse {
    (
        StatusCode::CONFLICT,
        Json(StatusResponse {
            status: format!("error: {}", message),
        }),
    )
}

/// GET /status - Session, model and pipeline state
pub async fn get_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.session.status().await)
}

/// POST /session/start - Start streaming
pub async fn start_session(
    State(state): State<AppState>,
) -> Result<Json<SessionStartedResponse>, ErrorResponse> {
    match state.session.start().await {
        Ok(session_id) => {
            info!("Session {} started via API", session_id);
            Ok(Json(SessionStartedResponse { session_id }))
        }
        Err(e) => {
            warn!("Failed to start session: {}", e);
            Err(conflict(e.to_string()))
        }
    }
}

/// POST /session/stop - Stop streaming
pub async fn stop_session(State(state): State<AppState>) -> Result<Json<SessionSummary>, ErrorResponse> {
    match state.session.stop().await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            warn!("Failed to stop session: {}", e);
            Err(conflict(e.to_string()))
        }
    }
}

/// POST /ingest - Feed the request body as one raw chunk
pub async fn ingest(State(state): State<AppState>, body: Bytes) -> Json<IngestResponse> {
    let records_enqueued = state.session.feed(&body);
    Json(IngestResponse {
        bytes: body.len(),
        records_enqueued,
        queue_size: state.session.source().queue_size(),
    })
}
