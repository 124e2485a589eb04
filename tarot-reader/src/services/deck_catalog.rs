//! Deck catalog
//!
//! Static mapping from deck id to its ordered card list. Card order matters:
//! the reading webhook answers with positional indices into this list.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::Card;

/// Deck used when none has been chosen
pub const DEFAULT_DECK: &str = "classic";

/// (id, name, description)
type CardRecord = (&'static str, &'static str, &'static str);

const CLASSIC_CARDS: [CardRecord; 22] = [
    ("the-fool", "The Fool", "Beginnings, spontaneity, a leap of faith."),
    ("the-magician", "The Magician", "Willpower, skill, turning intent into action."),
    ("the-high-priestess", "The High Priestess", "Intuition, hidden knowledge, the inner voice."),
    ("the-empress", "The Empress", "Abundance, nurture, creative growth."),
    ("the-emperor", "The Emperor", "Structure, authority, stable foundations."),
    ("the-hierophant", "The Hierophant", "Tradition, shared belief, learned wisdom."),
    ("the-lovers", "The Lovers", "Union, alignment of values, a meaningful choice."),
    ("the-chariot", "The Chariot", "Determination, momentum, victory through focus."),
    ("strength", "Strength", "Courage, patience, gentle control."),
    ("the-hermit", "The Hermit", "Reflection, solitude, searching within."),
    ("wheel-of-fortune", "Wheel of Fortune", "Cycles, turning points, fate in motion."),
    ("justice", "Justice", "Fairness, truth, cause and effect."),
    ("the-hanged-man", "The Hanged Man", "Surrender, a new perspective, pause before change."),
    ("death", "Death", "Endings that clear the way for transformation."),
    ("temperance", "Temperance", "Balance, moderation, patient blending."),
    ("the-devil", "The Devil", "Attachment, temptation, bonds worth examining."),
    ("the-tower", "The Tower", "Sudden upheaval, revelation, breaking false structures."),
    ("the-star", "The Star", "Hope, renewal, quiet guidance."),
    ("the-moon", "The Moon", "Illusion, uncertainty, the subconscious."),
    ("the-sun", "The Sun", "Success, vitality, clarity."),
    ("judgement", "Judgement", "Awakening, reckoning, answering a call."),
    ("the-world", "The World", "Completion, integration, a cycle fulfilled."),
];

const CRYPTO_CARDS: [CardRecord; 22] = [
    ("the-degen", "The Degen", "Fearless first steps into unknown markets."),
    ("the-dev", "The Dev", "Shipping code, building from raw intent."),
    ("the-oracle", "The Oracle", "Off-chain truth brought on-chain; trusted signals."),
    ("the-liquidity-pool", "The Liquidity Pool", "Abundance that grows when shared."),
    ("the-validator", "The Validator", "Order, consensus, securing the chain."),
    ("the-whitepaper", "The Whitepaper", "Founding doctrine, the vision everyone signs onto."),
    ("the-multisig", "The Multisig", "Partnership, shared keys, decisions made together."),
    ("the-bull-run", "The Bull Run", "Momentum and conviction carrying you forward."),
    ("diamond-hands", "Diamond Hands", "Patience and resolve under pressure."),
    ("the-cold-wallet", "The Cold Wallet", "Withdrawal, safekeeping, time offline."),
    ("the-halving", "The Halving", "Cycles of scarcity and renewal."),
    ("the-audit", "The Audit", "Truth revealed; every balance accounted for."),
    ("the-lockup", "The Lockup", "Value held still now so it can grow later."),
    ("the-rug-pull", "The Rug Pull", "An abrupt ending that forces a new beginning."),
    ("the-bridge", "The Bridge", "Moving value between worlds with care."),
    ("the-leverage", "The Leverage", "Temptation to overextend; chains of your own making."),
    ("the-hard-fork", "The Hard Fork", "A split that cannot be undone."),
    ("the-airdrop", "The Airdrop", "Unexpected gifts and renewed hope."),
    ("the-bear-market", "The Bear Market", "Fog, doubt, prices that hide true value."),
    ("the-all-time-high", "The All-Time High", "Clarity, success, the chart in full light."),
    ("the-merge", "The Merge", "A long-awaited transition finally executed."),
    ("the-genesis-block", "The Genesis Block", "Completion of one chain, the root of the next."),
];

/// One deck and its ordered cards
#[derive(Debug, Clone, Serialize)]
pub struct Deck {
    pub id: String,
    pub name: String,
    pub cards: Vec<Card>,
}

impl Deck {
    fn from_records(id: &str, name: &str, records: &[CardRecord]) -> Self {
        let cards = records
            .iter()
            .map(|(card_id, card_name, description)| Card {
                id: (*card_id).to_string(),
                name: (*card_name).to_string(),
                image_ref: format!("/decks/{}/{}.png", id, card_id),
                description: (*description).to_string(),
                deck: id.to_string(),
            })
            .collect();

        Self {
            id: id.to_string(),
            name: name.to_string(),
            cards,
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn card_at(&self, index: usize) -> Option<&Card> {
        self.cards.get(index)
    }

    /// Index clamped into `[0, len-1]`
    pub fn clamp_index(&self, index: i64) -> usize {
        let max = self.len().saturating_sub(1) as i64;
        index.clamp(0, max) as usize
    }
}

/// Read-only catalog of all decks
#[derive(Debug, Clone)]
pub struct DeckCatalog {
    decks: BTreeMap<String, Deck>,
}

impl DeckCatalog {
    /// Catalog with the built-in decks
    pub fn builtin() -> Self {
        Self::from_decks(vec![
            Deck::from_records(DEFAULT_DECK, "Classic Major Arcana", &CLASSIC_CARDS),
            Deck::from_records("crypto", "Crypto Arcana", &CRYPTO_CARDS),
        ])
    }

    pub fn from_decks(decks: Vec<Deck>) -> Self {
        Self {
            decks: decks.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    pub fn deck(&self, deck_id: &str) -> Option<&Deck> {
        self.decks.get(deck_id)
    }

    pub fn contains(&self, deck_id: &str) -> bool {
        self.decks.contains_key(deck_id)
    }

    pub fn decks(&self) -> impl Iterator<Item = &Deck> {
        self.decks.values()
    }

    /// Card count of a deck, 0 when unknown
    pub fn deck_size(&self, deck_id: &str) -> usize {
        self.deck(deck_id).map_or(0, Deck::len)
    }
}

impl Default for DeckCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
