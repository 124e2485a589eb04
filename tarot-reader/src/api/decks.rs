//! Deck catalog endpoints
//!
//! GET /decks, GET /decks/:id

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    services::Deck,
    AppState,
};

/// Deck listing entry
#[derive(Debug, Serialize)]
pub struct DeckSummary {
    pub id: String,
    pub name: String,
    pub card_count: usize,
}

/// GET /decks
pub async fn list_decks(State(state): State<AppState>) -> Json<Vec<DeckSummary>> {
    let decks = state
        .catalog
        .decks()
        .map(|deck| DeckSummary {
            id: deck.id.clone(),
            name: deck.name.clone(),
            card_count: deck.len(),
        })
        .collect();
    Json(decks)
}

/// GET /decks/:id
pub async fn get_deck(
    State(state): State<AppState>,
    Path(deck_id): Path<String>,
) -> ApiResult<Json<Deck>> {
    state
        .catalog
        .deck(&deck_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Deck {}", deck_id)))
}

pub fn deck_routes() -> Router<AppState> {
    Router::new()
        .route("/decks", get(list_decks))
        .route("/decks/:id", get(get_deck))
}
