//! Reading request pipeline
//!
//! Issues the reading webhook call and hands back a temporary placeholder
//! immediately. The authoritative answer arrives later as a
//! `TarotEvent::ReadingReady` (or `ReadingError`) on the event bus.
//!
//! **Single flight:** at most one reading call is in flight per registry.
//! A second `start_reading` for the same user and intention while one is
//! pending makes no network call; its ticket carries the pending request's id
//! so the caller waits on the same answer. Any other request is refused with
//! `PipelineError::Busy` until the pending one resolves.

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tarot_common::events::{EventBus, TarotEvent, WebhookResponse};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::deck_catalog::DeckCatalog;
use super::environment::WebhookEndpoint;
use super::payload::{parse_reading_reply, RawReading};
use super::webhook_client::WebhookClient;

/// Message shown while the real reading is computed
pub const PLACEHOLDER_MESSAGE: &str = "The cards are being shuffled. Please wait a moment…";

/// Pipeline errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No user id: connect a wallet before starting a reading")]
    NoUserId,

    #[error("Unknown deck: {0}")]
    UnknownDeck(String),

    #[error("Another reading is still being prepared, try again shortly")]
    Busy,
}

/// Input to `start_reading`
#[derive(Debug, Clone)]
pub struct ReadingRequest {
    pub intention: String,
    pub user_id: String,
    pub deck: String,
}

/// Immediate answer to `start_reading`
#[derive(Debug, Clone)]
pub struct ReadingTicket {
    /// Request whose final answer will be published
    pub request_id: Uuid,
    /// Temporary placeholder
    pub response: WebhookResponse,
    /// True when an already-pending request was reused
    pub joined_pending: bool,
}

/// Identity of the request occupying the single-flight slot
struct PendingRequest {
    request_id: Uuid,
    user_id: String,
    intention: String,
}

impl PendingRequest {
    fn serves(&self, request: &ReadingRequest) -> bool {
        self.user_id == request.user_id && self.intention == request.intention
    }
}

#[derive(Default)]
struct RegistryState {
    pending: Option<PendingRequest>,
    last_final: Option<(Uuid, WebhookResponse)>,
}

/// Clears the single-flight slot when the background task ends, panics included
struct PendingGuard {
    state: Arc<Mutex<RegistryState>>,
    request_id: Uuid,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.pending.as_ref().map(|p| p.request_id) == Some(self.request_id) {
            state.pending = None;
        }
    }
}

/// Owner of in-flight reading requests and the last final answer
pub struct ReadingRequestRegistry {
    client: Arc<WebhookClient>,
    catalog: Arc<DeckCatalog>,
    event_bus: EventBus,
    state: Arc<Mutex<RegistryState>>,
}

impl ReadingRequestRegistry {
    pub fn new(client: Arc<WebhookClient>, catalog: Arc<DeckCatalog>, event_bus: EventBus) -> Self {
        Self {
            client,
            catalog,
            event_bus,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Start (or join) a reading request
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_reading(&self, request: ReadingRequest) -> Result<ReadingTicket, PipelineError> {
        if request.user_id.trim().is_empty() {
            return Err(PipelineError::NoUserId);
        }

        let deck_size = self.catalog.deck_size(&request.deck);
        if deck_size == 0 {
            return Err(PipelineError::UnknownDeck(request.deck));
        }
        let response = placeholder(deck_size);

        let request_id = {
            let mut state = self.state.lock();
            if let Some(pending) = &state.pending {
                if !pending.serves(&request) {
                    debug!(request_id = %pending.request_id, "Reading for another intention in flight");
                    return Err(PipelineError::Busy);
                }
                debug!(request_id = %pending.request_id, "Reading already in flight, joining it");
                return Ok(ReadingTicket {
                    request_id: pending.request_id,
                    response,
                    joined_pending: true,
                });
            }
            let request_id = Uuid::new_v4();
            state.pending = Some(PendingRequest {
                request_id,
                user_id: request.user_id.clone(),
                intention: request.intention.clone(),
            });
            request_id
        };

        let guard = PendingGuard {
            state: self.state.clone(),
            request_id,
        };

        info!(%request_id, deck = %request.deck, "Reading request started");

        tokio::spawn(resolve_reading(
            self.client.clone(),
            self.catalog.clone(),
            self.event_bus.clone(),
            self.state.clone(),
            guard,
            request,
        ));

        Ok(ReadingTicket {
            request_id,
            response,
            joined_pending: false,
        })
    }

    /// Final answer of `request_id`, if it already resolved
    pub fn last_final(&self, request_id: Uuid) -> Option<WebhookResponse> {
        self.state
            .lock()
            .last_final
            .as_ref()
            .filter(|(id, _)| *id == request_id)
            .map(|(_, response)| response.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Receiver for `ReadingReady` / `ReadingError` (and every other event)
    pub fn subscribe(&self) -> broadcast::Receiver<TarotEvent> {
        self.event_bus.subscribe()
    }

    pub fn catalog(&self) -> &Arc<DeckCatalog> {
        &self.catalog
    }
}

/// Three uniform indices in `[0, deck_size)`, duplicates allowed
fn placeholder(deck_size: usize) -> WebhookResponse {
    let mut rng = rand::thread_rng();
    let indices = (0..3).map(|_| rng.gen_range(0..deck_size)).collect();
    WebhookResponse::temporary(indices, PLACEHOLDER_MESSAGE)
}

/// Clamp a parsed reply against the resolved deck and mark it final
fn finalize(raw: RawReading, catalog: &DeckCatalog, requested_deck: &str) -> WebhookResponse {
    let deck_override = match raw.deck {
        Some(deck) if catalog.contains(&deck) => Some(deck),
        Some(deck) => {
            warn!(deck = %deck, "Reading reply names an unknown deck, ignoring override");
            None
        }
        None => None,
    };

    let deck_id = deck_override.as_deref().unwrap_or(requested_deck);
    let selected_card_indices = match catalog.deck(deck_id) {
        Some(deck) => raw.indices.iter().map(|&i| deck.clamp_index(i)).collect(),
        None => vec![0; raw.indices.len()],
    };

    if raw
        .indices
        .iter()
        .zip(&selected_card_indices)
        .any(|(&raw, &clamped)| raw != clamped as i64)
    {
        warn!(raw = ?raw.indices, clamped = ?selected_card_indices, "Clamped out-of-range card indices");
    }

    WebhookResponse {
        selected_card_indices,
        message: raw.message,
        question: raw.question,
        is_temporary: false,
        deck: deck_override,
    }
}

async fn resolve_reading(
    client: Arc<WebhookClient>,
    catalog: Arc<DeckCatalog>,
    event_bus: EventBus,
    state: Arc<Mutex<RegistryState>>,
    guard: PendingGuard,
    request: ReadingRequest,
) {
    let request_id = guard.request_id;
    let payload = json!({
        "date": Utc::now().to_rfc3339(),
        "userid": request.user_id,
        "intention": request.intention,
    });

    let outcome = match client.call_endpoint(WebhookEndpoint::Reading, &payload).await {
        Ok(reply) => parse_reading_reply(&reply.body)
            .map(|raw| finalize(raw, &catalog, &request.deck))
            .map_err(|e| format!("Malformed reading reply: {}", e)),
        Err(e) => Err(e.to_string()),
    };

    let event = match outcome {
        Ok(response) => {
            state.lock().last_final = Some((request_id, response.clone()));
            info!(%request_id, indices = ?response.selected_card_indices, "Reading resolved");
            TarotEvent::ReadingReady {
                request_id,
                response,
                timestamp: Utc::now(),
            }
        }
        Err(message) => {
            error!(%request_id, error = %message, "Reading request failed");
            TarotEvent::ReadingError {
                request_id,
                error: message,
                timestamp: Utc::now(),
            }
        }
    };

    // Free the slot before listeners react
    drop(guard);
    event_bus.emit_lossy(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_in_range_and_temporary() {
        for _ in 0..50 {
            let response = placeholder(22);
            assert!(response.is_temporary);
            assert_eq!(response.selected_card_indices.len(), 3);
            assert!(response.selected_card_indices.iter().all(|&i| i < 22));
            assert_eq!(response.message.as_deref(), Some(PLACEHOLDER_MESSAGE));
        }
    }

    #[test]
    fn test_finalize_clamps_into_deck() {
        let catalog = DeckCatalog::builtin();
        let raw = RawReading {
            indices: vec![-5, 999, 2],
            message: Some("m".to_string()),
            question: None,
            deck: None,
        };
        let response = finalize(raw, &catalog, "classic");
        assert!(!response.is_temporary);
        assert_eq!(response.selected_card_indices, vec![0, 21, 2]);
    }

    #[test]
    fn test_finalize_drops_unknown_deck_override() {
        let catalog = DeckCatalog::builtin();
        let known = RawReading {
            indices: vec![1, 2, 3],
            message: None,
            question: None,
            deck: Some("crypto".to_string()),
        };
        assert_eq!(finalize(known, &catalog, "classic").deck.as_deref(), Some("crypto"));

        let unknown = RawReading {
            indices: vec![1, 2, 3],
            message: None,
            question: None,
            deck: Some("lunar".to_string()),
        };
        assert_eq!(finalize(unknown, &catalog, "classic").deck, None);
    }

    fn pending(request_id: Uuid) -> PendingRequest {
        PendingRequest {
            request_id,
            user_id: "user-1".to_string(),
            intention: "Will the launch succeed?".to_string(),
        }
    }

    fn request(user_id: &str, intention: &str) -> ReadingRequest {
        ReadingRequest {
            intention: intention.to_string(),
            user_id: user_id.to_string(),
            deck: "classic".to_string(),
        }
    }

    #[test]
    fn test_pending_guard_clears_only_its_own_request() {
        let state = Arc::new(Mutex::new(RegistryState::default()));
        let mine = Uuid::new_v4();
        state.lock().pending = Some(pending(mine));

        drop(PendingGuard {
            state: state.clone(),
            request_id: Uuid::new_v4(),
        });
        assert_eq!(state.lock().pending.as_ref().map(|p| p.request_id), Some(mine));

        drop(PendingGuard {
            state: state.clone(),
            request_id: mine,
        });
        assert!(state.lock().pending.is_none());
    }

    #[test]
    fn test_pending_request_serves_same_user_and_intention_only() {
        let slot = pending(Uuid::new_v4());
        assert!(slot.serves(&request("user-1", "Will the launch succeed?")));
        assert!(!slot.serves(&request("user-1", "Should I move abroad?")));
        assert!(!slot.serves(&request("user-2", "Will the launch succeed?")));
    }
}
