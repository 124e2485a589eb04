//! Webhook environment endpoints
//!
//! GET /environment, POST /environment

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tarot_common::config::WebhookUrls;
use tarot_common::Environment;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// GET/POST /environment response
#[derive(Debug, Serialize)]
pub struct EnvironmentResponse {
    pub environment: Environment,
    pub urls: WebhookUrls,
}

/// POST /environment request
#[derive(Debug, Deserialize)]
pub struct SetEnvironmentRequest {
    /// "development" / "dev" or "production" / "prod"
    pub environment: String,
}

fn current(state: &AppState) -> EnvironmentResponse {
    EnvironmentResponse {
        environment: state.environment.current(),
        urls: state.environment.urls().clone(),
    }
}

/// GET /environment
pub async fn get_environment(State(state): State<AppState>) -> Json<EnvironmentResponse> {
    Json(current(&state))
}

/// POST /environment
pub async fn set_environment(
    State(state): State<AppState>,
    Json(request): Json<SetEnvironmentRequest>,
) -> ApiResult<Json<EnvironmentResponse>> {
    let environment: Environment = request
        .environment
        .parse()
        .map_err(|e: tarot_common::Error| ApiError::BadRequest(e.to_string()))?;

    state.environment.set(environment);
    Ok(Json(current(&state)))
}

pub fn environment_routes() -> Router<AppState> {
    Router::new().route("/environment", get(get_environment).post(set_environment))
}
