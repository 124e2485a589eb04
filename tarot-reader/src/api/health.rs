//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("tarot-reader")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Active webhook environment
    pub environment: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// True while a reading webhook call is in flight
    pub reading_pending: bool,
    /// Last error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "tarot-reader".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.current().to_string(),
        uptime_seconds,
        reading_pending: state.registry.is_pending(),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
