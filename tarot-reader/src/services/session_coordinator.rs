//! Reading session coordinator
//!
//! Owns the single live `ReadingSession` and drives it through
//! INTENTION → PREPARING → SELECTION → READING → COMPLETE.
//!
//! **Temporary vs final:** `start_reading` hands the session a temporary
//! placeholder. The final answer arrives through `handle_event` (or is found
//! by polling the registry on every transition into Preparing, Selection or
//! Reading). A final answer is never replaced, and temporary data never
//! overwrites a final answer.
//!
//! **Selection → Reading:** entered once three cards are selected AND a
//! final answer is held. Whichever of the two happens last replaces the
//! selected cards wholesale with the cards at the final indices.
//!
//! Events for a request other than `pending_request` are discarded, and the
//! session `generation` lets delayed work (the preparation timer) detect a
//! reset that happened in between.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tarot_common::events::{EventBus, ReadingPhase, TarotEvent, WebhookResponse};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::account::{AccountError, AccountService};
use super::deck_catalog::{DeckCatalog, DEFAULT_DECK};
use super::environment::EnvironmentSettings;
use super::interpretation::{card_interpretation, generate_interpretation, InterpretationSource};
use super::reading_pipeline::{PipelineError, ReadingRequest, ReadingRequestRegistry, ReadingTicket};
use super::session_store::{keys, SessionStore};
use crate::models::{
    NoticeLevel, ReadingCard, ReadingSession, SessionView, WalletIdentity, SPREAD_SIZE,
};

/// Connection log entries kept in the session store
const CONNECTION_LOG_CAPACITY: usize = 50;

/// Coordinator errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Intention must not be empty")]
    EmptyIntention,

    #[error("Connect a wallet before starting a reading")]
    NoWallet,

    #[error("Operation not allowed in phase {0}")]
    WrongPhase(ReadingPhase),

    #[error("Unknown deck: {0}")]
    UnknownDeck(String),

    #[error("Unknown card: {0}")]
    UnknownCard(String),

    #[error("Card already selected: {0}")]
    AlreadySelected(String),

    #[error("All three cards are already selected")]
    SpreadFull,

    #[error("Card index {0} is out of range")]
    InvalidIndex(usize),

    #[error("Card {0} is already revealed")]
    AlreadyRevealed(usize),

    #[error("The reading is not ready yet (attempt {attempts})")]
    NotReady { attempts: u32 },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Account(#[from] AccountError),
}

/// Entry appended to `connectionLogs`
#[derive(Debug, Clone, Serialize)]
struct ConnectionLogEntry {
    timestamp: DateTime<Utc>,
    action: &'static str,
    wallet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn not_ready_message(attempts: u32) -> &'static str {
    match attempts {
        0 | 1 => "The cards are still being read. Please try again in a moment.",
        2 => "Still waiting for your reading to arrive…",
        _ => "Your reading is taking longer than usual. Keep waiting, or reset and try again.",
    }
}

/// Single-session reading coordinator
pub struct ReadingCoordinator {
    session: ReadingSession,
    wallet: Option<WalletIdentity>,
    registry: Arc<ReadingRequestRegistry>,
    accounts: Arc<AccountService>,
    catalog: Arc<DeckCatalog>,
    environment: Arc<EnvironmentSettings>,
    store: Arc<SessionStore>,
    event_bus: EventBus,
}

impl ReadingCoordinator {
    pub fn new(
        registry: Arc<ReadingRequestRegistry>,
        accounts: Arc<AccountService>,
        environment: Arc<EnvironmentSettings>,
        store: Arc<SessionStore>,
        event_bus: EventBus,
    ) -> Self {
        let catalog = registry.catalog().clone();
        Self {
            session: ReadingSession::new(0, DEFAULT_DECK),
            wallet: None,
            registry,
            accounts,
            catalog,
            environment,
            store,
            event_bus,
        }
    }

    pub fn session(&self) -> &ReadingSession {
        &self.session
    }

    pub fn phase(&self) -> ReadingPhase {
        self.session.phase
    }

    pub fn generation(&self) -> u64 {
        self.session.generation
    }

    pub fn wallet(&self) -> Option<&WalletIdentity> {
        self.wallet.as_ref()
    }

    /// Serializable view for the front end
    pub fn snapshot(&self) -> SessionView {
        SessionView {
            session: self.session.clone(),
            wallet: self.wallet.clone(),
        }
    }

    // ========================================================================
    // Wallet
    // ========================================================================

    pub fn accounts(&self) -> Arc<AccountService> {
        self.accounts.clone()
    }

    /// Remember the identity returned by the login webhook
    ///
    /// The webhook call itself runs without the coordinator lock, see
    /// [`connect_wallet`].
    pub fn apply_login(
        &mut self,
        wallet: &str,
        outcome: Result<WalletIdentity, AccountError>,
    ) -> Result<WalletIdentity, CoordinatorError> {
        match outcome {
            Ok(identity) => {
                self.log_connection("connect", wallet, Some(identity.user_id.clone()), None);
                self.event_bus.emit_lossy(TarotEvent::WalletConnected {
                    wallet: identity.wallet.clone(),
                    user_id: identity.user_id.clone(),
                    timestamp: Utc::now(),
                });
                self.wallet = Some(identity.clone());
                Ok(identity)
            }
            Err(e) => {
                warn!(wallet, error = %e, "Wallet login failed");
                self.log_connection("connect_failed", wallet, None, Some(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Drop the identity and reset the session
    pub fn disconnect_wallet(&mut self) {
        if let Some(identity) = self.wallet.take() {
            info!(user_id = %identity.user_id, "Wallet disconnected");
            self.log_connection("disconnect", &identity.wallet, Some(identity.user_id), None);
            self.event_bus.emit_lossy(TarotEvent::WalletDisconnected {
                wallet: identity.wallet,
                timestamp: Utc::now(),
            });
        }
        self.reset_reading();
    }

    fn log_connection(
        &self,
        action: &'static str,
        wallet: &str,
        user_id: Option<String>,
        error: Option<String>,
    ) {
        let entry = ConnectionLogEntry {
            timestamp: Utc::now(),
            action,
            wallet: wallet.to_string(),
            user_id,
            error,
        };
        self.store
            .append_capped(keys::CONNECTION_LOGS, &entry, CONNECTION_LOG_CAPACITY);
    }

    // ========================================================================
    // Phase operations
    // ========================================================================

    /// Choose the deck for the next reading (Intention only)
    ///
    /// Returns the user id the deck-select webhook should be told about, if a
    /// wallet is connected.
    pub fn choose_deck(&mut self, deck: &str) -> Result<Option<String>, CoordinatorError> {
        if self.session.phase != ReadingPhase::Intention {
            return Err(self.reject(CoordinatorError::WrongPhase(self.session.phase)));
        }
        if !self.catalog.contains(deck) {
            return Err(self.reject(CoordinatorError::UnknownDeck(deck.to_string())));
        }

        self.session.selected_deck = deck.to_string();
        info!(deck, "Deck selected");
        Ok(self.wallet.as_ref().map(|w| w.user_id.clone()))
    }

    /// Outcome of the deck-select webhook; failure only produces a warning
    pub fn apply_deck_confirmation(
        &mut self,
        deck: &str,
        generation: u64,
        outcome: Result<(), AccountError>,
    ) {
        let Err(e) = outcome else {
            debug!(deck, "Deck confirmed by the server");
            return;
        };
        warn!(deck, error = %e, "Deck-select webhook failed");
        if generation != self.session.generation {
            return;
        }
        self.session.push_notice(
            NoticeLevel::Warning,
            format!("Could not confirm deck with the server: {}", e),
        );
    }

    /// Submit the intention and request a reading
    pub fn start_reading(&mut self, intention: &str) -> Result<ReadingTicket, CoordinatorError> {
        if self.session.phase != ReadingPhase::Intention {
            return Err(self.reject(CoordinatorError::WrongPhase(self.session.phase)));
        }

        let intention = intention.trim();
        if intention.is_empty() {
            return Err(self.reject(CoordinatorError::EmptyIntention));
        }

        let Some(user_id) = self.wallet.as_ref().map(|w| w.user_id.clone()) else {
            return Err(self.reject(CoordinatorError::NoWallet));
        };

        let ticket = match self.registry.start_reading(ReadingRequest {
            intention: intention.to_string(),
            user_id,
            deck: self.session.selected_deck.clone(),
        }) {
            Ok(ticket) => ticket,
            Err(e) => return Err(self.reject(e.into())),
        };

        self.session.intention = intention.to_string();
        self.session.pending_request = Some(ticket.request_id);
        self.session.webhook_response = Some(ticket.response.clone());
        self.session.webhook_error = None;
        self.transition(ReadingPhase::Preparing);

        Ok(ticket)
    }

    /// Fill the card pool and move to Selection
    pub fn load_card_pool(&mut self) -> Result<(), CoordinatorError> {
        if self.session.phase != ReadingPhase::Preparing {
            return Err(CoordinatorError::WrongPhase(self.session.phase));
        }

        if let Some(deck) = self.session.final_response().and_then(|r| r.deck.clone()) {
            self.session.selected_deck = deck;
        }

        let deck_id = self.session.selected_deck.clone();
        let Some(deck) = self.catalog.deck(&deck_id) else {
            return Err(self.reject(CoordinatorError::UnknownDeck(deck_id)));
        };
        self.session.available_cards = deck.cards.clone();
        debug!(deck = %deck_id, cards = deck.len(), "Card pool loaded");

        self.transition(ReadingPhase::Selection);
        Ok(())
    }

    /// Add a card to the spread
    pub fn select_card(&mut self, card_id: &str) -> Result<(), CoordinatorError> {
        if self.session.phase != ReadingPhase::Selection {
            return Err(self.reject(CoordinatorError::WrongPhase(self.session.phase)));
        }
        if self.session.spread_full() {
            return Err(self.reject(CoordinatorError::SpreadFull));
        }
        if self.session.selected_cards.iter().any(|c| c.id() == card_id) {
            return Err(self.reject(CoordinatorError::AlreadySelected(card_id.to_string())));
        }
        let card = self
            .session
            .available_cards
            .iter()
            .find(|c| c.id == card_id)
            .cloned();
        let Some(card) = card else {
            return Err(self.reject(CoordinatorError::UnknownCard(card_id.to_string())));
        };

        let position = self.session.selected_cards.len();
        self.session.selected_cards.push(ReadingCard::new(card, position));
        debug!(card_id, position, "Card selected");

        if self.session.spread_full() && self.session.has_final_response() {
            self.enter_reading();
        } else {
            self.persist();
        }
        Ok(())
    }

    /// Reveal the card at `index`
    pub fn reveal_card(&mut self, index: usize) -> Result<ReadingCard, CoordinatorError> {
        let waiting_for_final = self.session.phase == ReadingPhase::Selection
            && self.session.spread_full()
            && !self.session.has_final_response();

        if waiting_for_final {
            self.session.reveal_retries += 1;
            let attempts = self.session.reveal_retries;
            let level = if attempts >= 3 {
                NoticeLevel::Warning
            } else {
                NoticeLevel::Info
            };
            self.session.push_notice(level, not_ready_message(attempts));
            debug!(attempts, "Reveal requested before the final reading arrived");
            return Err(CoordinatorError::NotReady { attempts });
        }

        if self.session.phase != ReadingPhase::Reading {
            return Err(CoordinatorError::WrongPhase(self.session.phase));
        }
        let Some(card) = self.session.selected_cards.get(index) else {
            return Err(CoordinatorError::InvalidIndex(index));
        };
        if card.revealed {
            return Err(CoordinatorError::AlreadyRevealed(index));
        }

        let text = card_interpretation(card, &self.session.intention);
        let card = &mut self.session.selected_cards[index];
        card.revealed = true;
        card.interpretation = Some(text);
        let revealed = card.clone();
        self.session.revealed_card_ids.push(revealed.id().to_string());
        info!(index, card_id = %revealed.id(), "Card revealed");

        if self.session.all_revealed() {
            let source = match self.session.final_response() {
                Some(response) => InterpretationSource::Response(response),
                None => InterpretationSource::None,
            };
            let interpretation =
                generate_interpretation(&self.session.selected_cards, &self.session.intention, source);
            self.session.interpretation = Some(interpretation);
            self.transition(ReadingPhase::Complete);
        } else {
            self.persist();
        }

        Ok(revealed)
    }

    /// Return to Intention, clearing everything session-scoped
    ///
    /// Keeps the chosen deck and the wallet identity. Idempotent.
    pub fn reset_reading(&mut self) {
        if self.session.is_pristine() {
            self.store.remove_many(&keys::READING_KEYS);
            return;
        }

        let old_phase = self.session.phase;
        let generation = self.session.generation + 1;
        let deck = std::mem::take(&mut self.session.selected_deck);
        self.session = ReadingSession::new(generation, deck);
        self.store.remove_many(&keys::READING_KEYS);

        info!(generation, from = %old_phase, "Reading reset");
        self.emit_phase_change(old_phase, ReadingPhase::Intention);
    }

    // ========================================================================
    // Asynchronous results
    // ========================================================================

    /// React to a bus event
    pub fn handle_event(&mut self, event: &TarotEvent) {
        match event {
            TarotEvent::ReadingReady {
                request_id,
                response,
                ..
            } => {
                if self.session.pending_request != Some(*request_id) {
                    debug!(%request_id, "Discarding reading for another request");
                    return;
                }
                self.apply_final(response.clone());
            }
            TarotEvent::ReadingError {
                request_id, error, ..
            } => {
                if self.session.pending_request != Some(*request_id) {
                    debug!(%request_id, "Discarding error for another request");
                    return;
                }
                self.apply_error(error);
            }
            TarotEvent::EnvironmentChanged { environment, .. } => {
                debug!(%environment, "Webhook environment switched");
            }
            _ => {}
        }
    }

    /// Pick up a final answer the registry resolved while we were not listening
    fn poll_registry(&mut self) {
        if self.session.has_final_response() {
            return;
        }
        let Some(request_id) = self.session.pending_request else {
            return;
        };
        if let Some(response) = self.registry.last_final(request_id) {
            debug!(%request_id, "Final reading found by polling");
            self.apply_final(response);
        }
    }

    /// Recover from missed events by polling the registry
    fn poll_after_lag(&mut self) {
        if self.session.phase.polls_for_final() {
            self.poll_registry();
        }
    }

    fn apply_final(&mut self, response: WebhookResponse) {
        if response.is_temporary {
            debug!("Ignoring temporary reading payload");
            return;
        }
        if self.session.has_final_response() {
            return;
        }
        if matches!(
            self.session.phase,
            ReadingPhase::Intention | ReadingPhase::Complete
        ) {
            return;
        }

        info!(indices = ?response.selected_card_indices, phase = %self.session.phase, "Final reading received");
        self.session.webhook_response = Some(response);
        self.session.webhook_error = None;

        if self.session.phase == ReadingPhase::Selection && self.session.spread_full() {
            self.enter_reading();
        } else {
            self.persist();
        }
    }

    fn apply_error(&mut self, error: &str) {
        if self.session.has_final_response() {
            return;
        }
        warn!(phase = %self.session.phase, error, "Reading request failed");
        self.session.webhook_error = Some(error.to_string());

        match self.session.phase {
            ReadingPhase::Preparing if self.environment.current().is_production() => {
                self.abort_to_intention(error);
            }
            ReadingPhase::Preparing | ReadingPhase::Selection => {
                self.session.push_notice(
                    NoticeLevel::Error,
                    format!("Your reading could not be prepared: {}", error),
                );
                self.persist();
            }
            _ => self.persist(),
        }
    }

    /// Back to Intention after a failed preparation, keeping the intention text
    fn abort_to_intention(&mut self, error: &str) {
        let old_phase = self.session.phase;
        let generation = self.session.generation + 1;
        let mut session = ReadingSession::new(generation, std::mem::take(&mut self.session.selected_deck));
        session.intention = std::mem::take(&mut self.session.intention);
        session.notices = std::mem::take(&mut self.session.notices);
        session.webhook_error = Some(error.to_string());
        session.push_notice(
            NoticeLevel::Error,
            format!("Your reading could not be prepared: {}", error),
        );
        self.session = session;
        self.store.remove_many(&keys::READING_KEYS);

        info!(generation, "Preparation aborted");
        self.emit_phase_change(old_phase, ReadingPhase::Intention);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Replace the selection with the server's cards and enter Reading
    fn enter_reading(&mut self) {
        let Some(response) = self.session.final_response() else {
            return;
        };
        let deck_id = response
            .deck
            .clone()
            .unwrap_or_else(|| self.session.selected_deck.clone());
        let Some(deck) = self.catalog.deck(&deck_id) else {
            warn!(deck = %deck_id, "Final reading names no known deck");
            return;
        };

        let cards: Vec<ReadingCard> = response
            .selected_card_indices
            .iter()
            .take(SPREAD_SIZE)
            .enumerate()
            .filter_map(|(slot, &index)| {
                deck.card_at(deck.clamp_index(index as i64))
                    .map(|card| ReadingCard::new(card.clone(), slot))
            })
            .collect();

        info!(
            cards = ?cards.iter().map(ReadingCard::id).collect::<Vec<_>>(),
            "Spread replaced with the final reading's cards"
        );
        self.session.selected_cards = cards;
        self.session.revealed_card_ids.clear();
        self.transition(ReadingPhase::Reading);
    }

    fn transition(&mut self, new_phase: ReadingPhase) {
        let old_phase = self.session.phase;
        if !old_phase.can_transition_to(new_phase) {
            warn!(from = %old_phase, to = %new_phase, "Refusing illegal phase transition");
            return;
        }

        let transition = self.session.transition_to(new_phase);
        info!(
            generation = transition.session_generation,
            from = %transition.old_phase,
            to = %transition.new_phase,
            "Phase changed"
        );
        self.emit_phase_change(old_phase, new_phase);

        if new_phase.polls_for_final() {
            self.poll_registry();
        }
        self.persist();
    }

    fn emit_phase_change(&self, old_phase: ReadingPhase, new_phase: ReadingPhase) {
        self.event_bus.emit_lossy(TarotEvent::PhaseChanged {
            session_generation: self.session.generation,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }

    /// Surface a validation failure as a warning notice and return it
    fn reject(&mut self, error: CoordinatorError) -> CoordinatorError {
        debug!(error = %error, phase = %self.session.phase, "Operation rejected");
        self.session
            .push_notice(NoticeLevel::Warning, error.to_string());
        error
    }

    fn persist(&self) {
        if self.session.is_pristine() {
            self.store.remove_many(&keys::READING_KEYS);
            return;
        }
        self.store.set(keys::CURRENT_READING, &self.session);
        self.store
            .set(keys::REVEALED_CARDS, &self.session.revealed_card_ids);
    }
}

/// Log in through the login webhook and remember the identity
///
/// The coordinator stays unlocked while the webhook runs so reading events
/// keep flowing.
pub async fn connect_wallet(
    coordinator: &Mutex<ReadingCoordinator>,
    wallet: &str,
    wallet_type: &str,
) -> Result<WalletIdentity, CoordinatorError> {
    let accounts = coordinator.lock().await.accounts();
    let outcome = accounts.login(wallet, wallet_type).await;
    coordinator.lock().await.apply_login(wallet, outcome)
}

/// Choose the deck and inform the deck-select webhook without holding the
/// coordinator lock across the call
pub async fn select_deck(
    coordinator: &Mutex<ReadingCoordinator>,
    deck: &str,
) -> Result<(), CoordinatorError> {
    let (accounts, user_id, generation) = {
        let mut coordinator = coordinator.lock().await;
        let user_id = coordinator.choose_deck(deck)?;
        (coordinator.accounts(), user_id, coordinator.generation())
    };

    if let Some(user_id) = user_id {
        let outcome = accounts.select_deck(&user_id, deck).await;
        coordinator
            .lock()
            .await
            .apply_deck_confirmation(deck, generation, outcome);
    }
    Ok(())
}

/// After `delay`, load the card pool if the session is still the one that
/// scheduled it and is still preparing
pub fn schedule_card_pool(
    coordinator: Arc<Mutex<ReadingCoordinator>>,
    generation: u64,
    delay: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let mut coordinator = coordinator.lock().await;
        if coordinator.generation() != generation
            || coordinator.phase() != ReadingPhase::Preparing
        {
            debug!(generation, "Preparation timer is stale, skipping");
            return;
        }
        if let Err(e) = coordinator.load_card_pool() {
            warn!(error = %e, "Card pool could not be loaded");
        }
    })
}

/// Forward events from `rx` (usually `ReadingRequestRegistry::subscribe`)
/// to the coordinator until the bus closes
pub fn spawn_event_listener(
    coordinator: Arc<Mutex<ReadingCoordinator>>,
    mut rx: broadcast::Receiver<TarotEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;

        info!("Coordinator event listener started");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if matches!(
                        event,
                        TarotEvent::ReadingReady { .. }
                            | TarotEvent::ReadingError { .. }
                            | TarotEvent::EnvironmentChanged { .. }
                    ) {
                        coordinator.lock().await.handle_event(&event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Coordinator event listener lagged");
                    coordinator.lock().await.poll_after_lag();
                }
                Err(RecvError::Closed) => {
                    info!("Event bus closed, coordinator listener stopping");
                    break;
                }
            }
        }
    })
}
