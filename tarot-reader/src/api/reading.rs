//! Reading session endpoints
//!
//! GET /reading, POST /reading/{deck,start,select,reveal,reset}

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tarot_common::events::{ReadingPhase, WebhookResponse};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::ApiResult,
    models::{Interpretation, ReadingCard, SessionView},
    services::{self, schedule_card_pool},
    AppState,
};

/// POST /reading/deck request
#[derive(Debug, Deserialize)]
pub struct SelectDeckRequest {
    pub deck: String,
}

/// POST /reading/start request
#[derive(Debug, Deserialize)]
pub struct StartReadingRequest {
    pub intention: String,
}

/// POST /reading/start response
#[derive(Debug, Serialize)]
pub struct StartReadingResponse {
    pub request_id: Uuid,
    pub phase: ReadingPhase,
    /// Temporary placeholder until the final reading arrives
    pub placeholder: WebhookResponse,
    /// True when an in-flight reading was joined instead of a new call
    pub joined_pending: bool,
}

/// POST /reading/select request
#[derive(Debug, Deserialize)]
pub struct SelectCardRequest {
    pub card_id: String,
}

/// POST /reading/reveal request
#[derive(Debug, Deserialize)]
pub struct RevealCardRequest {
    pub index: usize,
}

/// POST /reading/reveal response
#[derive(Debug, Serialize)]
pub struct RevealCardResponse {
    pub card: ReadingCard,
    pub phase: ReadingPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<Interpretation>,
}

/// GET /reading
pub async fn get_reading(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.coordinator.lock().await.snapshot())
}

/// POST /reading/deck
pub async fn select_deck(
    State(state): State<AppState>,
    Json(request): Json<SelectDeckRequest>,
) -> ApiResult<Json<SessionView>> {
    services::select_deck(&state.coordinator, &request.deck).await?;
    Ok(Json(state.coordinator.lock().await.snapshot()))
}

/// POST /reading/start
///
/// Moves the session to Preparing and schedules the card pool to load after
/// the preparation delay.
pub async fn start_reading(
    State(state): State<AppState>,
    Json(request): Json<StartReadingRequest>,
) -> ApiResult<Json<StartReadingResponse>> {
    let (ticket, phase, generation) = {
        let mut coordinator = state.coordinator.lock().await;
        let ticket = coordinator.start_reading(&request.intention)?;
        (ticket, coordinator.phase(), coordinator.generation())
    };

    info!(
        request_id = %ticket.request_id,
        generation,
        delay_ms = state.preparation_delay.as_millis() as u64,
        "Reading started, card pool scheduled"
    );
    schedule_card_pool(state.coordinator.clone(), generation, state.preparation_delay);

    Ok(Json(StartReadingResponse {
        request_id: ticket.request_id,
        phase,
        placeholder: ticket.response,
        joined_pending: ticket.joined_pending,
    }))
}

/// POST /reading/select
pub async fn select_card(
    State(state): State<AppState>,
    Json(request): Json<SelectCardRequest>,
) -> ApiResult<Json<SessionView>> {
    let mut coordinator = state.coordinator.lock().await;
    coordinator.select_card(&request.card_id)?;
    Ok(Json(coordinator.snapshot()))
}

/// POST /reading/reveal
pub async fn reveal_card(
    State(state): State<AppState>,
    Json(request): Json<RevealCardRequest>,
) -> ApiResult<Json<RevealCardResponse>> {
    let mut coordinator = state.coordinator.lock().await;
    let card = coordinator.reveal_card(request.index)?;
    let session = coordinator.session();

    Ok(Json(RevealCardResponse {
        card,
        phase: session.phase,
        interpretation: session.interpretation.clone(),
    }))
}

/// POST /reading/reset
pub async fn reset_reading(State(state): State<AppState>) -> Json<SessionView> {
    let mut coordinator = state.coordinator.lock().await;
    coordinator.reset_reading();
    Json(coordinator.snapshot())
}

pub fn reading_routes() -> Router<AppState> {
    Router::new()
        .route("/reading", get(get_reading))
        .route("/reading/deck", post(select_deck))
        .route("/reading/start", post(start_reading))
        .route("/reading/select", post(select_card))
        .route("/reading/reveal", post(reveal_card))
        .route("/reading/reset", post(reset_reading))
}
