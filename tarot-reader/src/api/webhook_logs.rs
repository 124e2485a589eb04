//! Webhook call log endpoints
//!
//! GET /webhook/logs, DELETE /webhook/logs

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::{services::WebhookLogEntry, AppState};

/// GET /webhook/logs (oldest first)
pub async fn list_logs(State(state): State<AppState>) -> Json<Vec<WebhookLogEntry>> {
    Json(state.webhook_log.entries())
}

/// DELETE /webhook/logs
pub async fn clear_logs(State(state): State<AppState>) -> StatusCode {
    state.webhook_log.clear();
    StatusCode::NO_CONTENT
}

pub fn webhook_log_routes() -> Router<AppState> {
    Router::new().route("/webhook/logs", get(list_logs).delete(clear_logs))
}
