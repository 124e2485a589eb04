//! Interpretation assembler
//!
//! Combines per-card text with the reading's final narrative. Remote text
//! always wins over local filler, and the result is never empty.

use serde_json::Value;
use std::collections::BTreeMap;
use tarot_common::events::WebhookResponse;
use tracing::debug;

use super::payload::{extract_narrative, extract_narrative_text, Narrative};
use crate::models::{Interpretation, MessageSource, ReadingCard};

/// Where the narrative should be read from
#[derive(Debug, Clone, Copy)]
pub enum InterpretationSource<'a> {
    None,
    Text(&'a str),
    Response(&'a WebhookResponse),
    Raw(&'a Value),
}

/// Text for one revealed card, built from its spread position
pub fn card_interpretation(card: &ReadingCard, intention: &str) -> String {
    let position = card.spread_position();
    let intention = intention.trim();
    let focus = if intention.is_empty() {
        "your question".to_string()
    } else {
        format!("\"{}\"", intention)
    };

    format!(
        "{}: {}. {} In the {} of {}, this card asks to be read with care.",
        position.label(),
        card.card.name,
        card.card.description,
        position.label().to_lowercase(),
        focus
    )
}

fn narrative_from(source: InterpretationSource<'_>) -> Narrative {
    match source {
        InterpretationSource::None => Narrative::default(),
        InterpretationSource::Text(text) => extract_narrative_text(text),
        InterpretationSource::Raw(value) => extract_narrative(value),
        InterpretationSource::Response(response) if response.is_temporary => {
            debug!("Ignoring placeholder text from a temporary response");
            Narrative::default()
        }
        InterpretationSource::Response(response) => Narrative {
            message: response.message.clone().filter(|m| !m.trim().is_empty()),
            question: response.question.clone().filter(|q| !q.trim().is_empty()),
        },
    }
}

fn synthesize_message(cards: &[ReadingCard]) -> String {
    let names: Vec<&str> = cards.iter().map(|c| c.card.name.as_str()).collect();
    let drawn = match names.as_slice() {
        [] => return "The cards are quiet for now, yet your intention has been heard. \
            Sit with it a while and return when the moment feels right."
            .to_string(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    };

    format!(
        "Your spread draws {}. Read together, they describe a passage from what \
         shaped you, through where you stand, toward what is forming. Trust the \
         pattern more than any single card.",
        drawn
    )
}

/// Compose the final interpretation
pub fn generate_interpretation(
    cards: &[ReadingCard],
    intention: &str,
    source: InterpretationSource<'_>,
) -> Interpretation {
    let narrative = narrative_from(source);

    let (message, message_source) = match narrative.message {
        Some(message) => (message, MessageSource::Remote),
        None => (synthesize_message(cards), MessageSource::Synthesized),
    };

    let summary = match narrative.question {
        Some(question) => format!("{}\n\n{}", question, message),
        None => message,
    };

    let card_interpretations: BTreeMap<String, String> = cards
        .iter()
        .map(|card| {
            let text = card
                .interpretation
                .clone()
                .unwrap_or_else(|| card_interpretation(card, intention));
            (card.id().to_string(), text)
        })
        .collect();

    Interpretation {
        summary,
        card_interpretations,
        message_source,
    }
}
