//! Reading session state
//!
//! The session progresses through five phases:
//! INTENTION → PREPARING → SELECTION → READING → COMPLETE
//!
//! Only a reset moves backwards (to INTENTION). The coordinator owns the
//! single live session; this module holds the data and the bookkeeping that
//! does not need collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tarot_common::events::{ReadingPhase, WebhookResponse};
use uuid::Uuid;

use super::{Card, Interpretation, ReadingCard};

/// Maximum number of cards in a spread
pub const SPREAD_SIZE: usize = 3;

/// Most recent notices kept on the session
const MAX_NOTICES: usize = 20;

/// Phase transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub session_generation: u64,
    pub old_phase: ReadingPhase,
    pub new_phase: ReadingPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-facing message (inline warning or toast)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Identity returned by the login webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    pub wallet: String,
    pub wallet_type: String,
    pub user_id: String,
    pub runs_today: bool,
}

/// Reading session aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSession {
    /// Bumped on every reset; stale async work compares against it
    pub generation: u64,

    pub intention: String,

    pub phase: ReadingPhase,

    /// Deck chosen by the user (or confirmed by the webhook)
    pub selected_deck: String,

    /// Card pool for the selection phase
    pub available_cards: Vec<Card>,

    /// 0..=3 cards in spread order
    pub selected_cards: Vec<ReadingCard>,

    pub revealed_card_ids: Vec<String>,

    /// Current response, temporary until the final one arrives
    pub webhook_response: Option<WebhookResponse>,

    pub webhook_error: Option<String>,

    /// Reading request this session is waiting on
    pub pending_request: Option<Uuid>,

    /// Reveal attempts rejected because the final response was missing
    pub reveal_retries: u32,

    pub interpretation: Option<Interpretation>,

    pub notices: Vec<Notice>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl ReadingSession {
    /// Create an empty session in the Intention phase
    pub fn new(generation: u64, selected_deck: impl Into<String>) -> Self {
        Self {
            generation,
            intention: String::new(),
            phase: ReadingPhase::Intention,
            selected_deck: selected_deck.into(),
            available_cards: Vec::new(),
            selected_cards: Vec::new(),
            revealed_card_ids: Vec::new(),
            webhook_response: None,
            webhook_error: None,
            pending_request: None,
            reveal_retries: 0,
            interpretation: None,
            notices: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to a new phase, returning the transition record
    ///
    /// Callers check legality with `ReadingPhase::can_transition_to` first.
    pub fn transition_to(&mut self, new_phase: ReadingPhase) -> PhaseTransition {
        let transition = PhaseTransition {
            session_generation: self.generation,
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;

        match new_phase {
            ReadingPhase::Preparing => self.started_at = Some(Utc::now()),
            ReadingPhase::Complete => self.completed_at = Some(Utc::now()),
            _ => {}
        }

        transition
    }

    /// Record a user-facing notice, keeping only the most recent ones
    pub fn push_notice(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    /// True once a non-temporary response is held
    pub fn has_final_response(&self) -> bool {
        self.webhook_response
            .as_ref()
            .is_some_and(WebhookResponse::is_final)
    }

    /// The held response if it is final
    pub fn final_response(&self) -> Option<&WebhookResponse> {
        self.webhook_response.as_ref().filter(|r| r.is_final())
    }

    pub fn spread_full(&self) -> bool {
        self.selected_cards.len() >= SPREAD_SIZE
    }

    pub fn all_revealed(&self) -> bool {
        self.selected_cards.len() == SPREAD_SIZE && self.selected_cards.iter().all(|c| c.revealed)
    }

    /// True when nothing session-scoped has happened since the last reset
    pub fn is_pristine(&self) -> bool {
        self.phase == ReadingPhase::Intention
            && self.intention.is_empty()
            && self.available_cards.is_empty()
            && self.selected_cards.is_empty()
            && self.webhook_response.is_none()
            && self.webhook_error.is_none()
            && self.pending_request.is_none()
            && self.interpretation.is_none()
            && self.notices.is_empty()
    }
}

/// Serializable snapshot served to the front end
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: ReadingSession,
    pub wallet: Option<WalletIdentity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty_intention() {
        let session = ReadingSession::new(0, "classic");
        assert_eq!(session.phase, ReadingPhase::Intention);
        assert!(session.selected_cards.is_empty());
        assert!(!session.has_final_response());
        assert_eq!(session.selected_deck, "classic");
        assert!(session.is_pristine());
    }

    #[test]
    fn test_transition_records_old_and_new() {
        let mut session = ReadingSession::new(3, "classic");
        let transition = session.transition_to(ReadingPhase::Preparing);

        assert_eq!(transition.session_generation, 3);
        assert_eq!(transition.old_phase, ReadingPhase::Intention);
        assert_eq!(transition.new_phase, ReadingPhase::Preparing);
        assert!(session.started_at.is_some());
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn test_notices_are_bounded() {
        let mut session = ReadingSession::new(0, "classic");
        for i in 0..(MAX_NOTICES + 5) {
            session.push_notice(NoticeLevel::Info, format!("notice {i}"));
        }
        assert_eq!(session.notices.len(), MAX_NOTICES);
        assert_eq!(session.notices[0].message, "notice 5");
    }

    #[test]
    fn test_temporary_response_is_not_final() {
        let mut session = ReadingSession::new(0, "classic");
        session.webhook_response = Some(WebhookResponse::temporary(vec![0, 1, 2], "wait"));
        assert!(!session.has_final_response());
        assert!(session.final_response().is_none());
    }
}
