//! Composed reading interpretation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the summary's narrative came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// Authoritative text from the reading webhook
    Remote,
    /// Locally synthesized filler
    Synthesized,
}

/// Final human-readable reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    /// `"{question}\n\n{message}"` when a question is known, else the message
    pub summary: String,
    /// Per-card text keyed by card id
    pub card_interpretations: BTreeMap<String, String>,
    pub message_source: MessageSource,
}
