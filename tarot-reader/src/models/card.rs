//! Card models
//!
//! `Card` is an immutable catalog entry. `ReadingCard` is the copy a session
//! owns while the user selects and reveals it.

use serde::{Deserialize, Serialize};

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Unique within its deck
    pub id: String,
    pub name: String,
    /// Opaque image reference resolved by the front end
    pub image_ref: String,
    pub description: String,
    /// Deck key this card belongs to
    pub deck: String,
}

/// Three-card spread position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadPosition {
    Past,
    Present,
    Future,
}

impl SpreadPosition {
    /// Position for a 0-based slot; slots past the third reuse `Future`
    pub fn from_slot(slot: usize) -> Self {
        match slot {
            0 => SpreadPosition::Past,
            1 => SpreadPosition::Present,
            _ => SpreadPosition::Future,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpreadPosition::Past => "Past",
            SpreadPosition::Present => "Present",
            SpreadPosition::Future => "Future",
        }
    }
}

/// A card inside a reading session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingCard {
    #[serde(flatten)]
    pub card: Card,
    /// 0-based slot in the spread
    pub position: usize,
    pub revealed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
}

impl ReadingCard {
    /// Face-down card at the given slot
    pub fn new(card: Card, position: usize) -> Self {
        Self {
            card,
            position,
            revealed: false,
            interpretation: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.card.id
    }

    pub fn spread_position(&self) -> SpreadPosition {
        SpreadPosition::from_slot(self.position)
    }
}
