//! HTTP control surface
//!
//! Session control, raw chunk ingestion, status and an SSE event feed.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::session::StreamingSession;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<StreamingSession>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(handlers::get_status))
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        .route("/ingest", post(handlers::ingest))
        .route("/events", get(sse::event_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "signglove-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}
