//! Reading-related type definitions
//!
//! Supporting types for the reading phase machine and webhook answers.
//! They live here because they travel inside `TarotEvent` payloads.

use serde::{Deserialize, Serialize};

/// Reading phase enumeration
///
/// Strictly forward-moving: Intention → Preparing → Selection → Reading → Complete.
/// Only a reset returns to `Intention`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingPhase {
    /// Waiting for the user's intention
    #[default]
    Intention,
    /// Reading requested, card pool being prepared
    Preparing,
    /// User is picking three cards
    Selection,
    /// Cards are face down and being revealed
    Reading,
    /// All cards revealed, summary composed
    Complete,
}

impl ReadingPhase {
    fn ordinal(self) -> u8 {
        match self {
            ReadingPhase::Intention => 0,
            ReadingPhase::Preparing => 1,
            ReadingPhase::Selection => 2,
            ReadingPhase::Reading => 3,
            ReadingPhase::Complete => 4,
        }
    }

    /// Whether moving to `target` is a legal transition
    ///
    /// Forward moves are single steps; any phase may return to `Intention` (reset).
    pub fn can_transition_to(self, target: ReadingPhase) -> bool {
        target == ReadingPhase::Intention || target.ordinal() == self.ordinal() + 1
    }

    /// Phases that trigger a poll for an already-resolved final response
    pub fn polls_for_final(self) -> bool {
        matches!(
            self,
            ReadingPhase::Preparing | ReadingPhase::Selection | ReadingPhase::Reading
        )
    }
}

impl std::fmt::Display for ReadingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingPhase::Intention => write!(f, "intention"),
            ReadingPhase::Preparing => write!(f, "preparing"),
            ReadingPhase::Selection => write!(f, "selection"),
            ReadingPhase::Reading => write!(f, "reading"),
            ReadingPhase::Complete => write!(f, "complete"),
        }
    }
}

/// One reading's server-computed answer
///
/// While `is_temporary` is true the indices and message are placeholder data
/// for animation only. Once false they are authoritative for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// Positional indices into the resolved deck's card list (length 3)
    pub selected_card_indices: Vec<usize>,
    /// Final narrative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Echo of the user's intention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Distinguishes placeholder from authoritative data
    pub is_temporary: bool,
    /// Server-confirmed deck override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck: Option<String>,
}

impl WebhookResponse {
    /// Build a placeholder response
    pub fn temporary(indices: Vec<usize>, message: impl Into<String>) -> Self {
        Self {
            selected_card_indices: indices,
            message: Some(message.into()),
            question: None,
            is_temporary: true,
            deck: None,
        }
    }

    /// True once the response is authoritative
    pub fn is_final(&self) -> bool {
        !self.is_temporary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_forward_transitions_only_single_steps() {
        assert!(ReadingPhase::Intention.can_transition_to(ReadingPhase::Preparing));
        assert!(ReadingPhase::Preparing.can_transition_to(ReadingPhase::Selection));
        assert!(ReadingPhase::Selection.can_transition_to(ReadingPhase::Reading));
        assert!(ReadingPhase::Reading.can_transition_to(ReadingPhase::Complete));

        assert!(!ReadingPhase::Intention.can_transition_to(ReadingPhase::Selection));
        assert!(!ReadingPhase::Reading.can_transition_to(ReadingPhase::Selection));
        assert!(!ReadingPhase::Complete.can_transition_to(ReadingPhase::Reading));
    }

    #[test]
    fn test_phase_reset_allowed_from_anywhere() {
        for phase in [
            ReadingPhase::Intention,
            ReadingPhase::Preparing,
            ReadingPhase::Selection,
            ReadingPhase::Reading,
            ReadingPhase::Complete,
        ] {
            assert!(phase.can_transition_to(ReadingPhase::Intention), "{phase} → intention");
        }
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&ReadingPhase::Selection).expect("serialize");
        assert_eq!(json, "\"selection\"");
    }

    #[test]
    fn test_temporary_response_constructor() {
        let response = WebhookResponse::temporary(vec![1, 1, 4], "please wait");
        assert!(response.is_temporary);
        assert!(!response.is_final());
        assert_eq!(response.message.as_deref(), Some("please wait"));
        assert_eq!(response.deck, None);
    }
}
