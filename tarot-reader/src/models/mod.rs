//! Data models for the tarot reading service
//!
//! - Catalog cards and their in-session counterparts
//! - Reading session aggregate and its serializable view

pub mod card;
pub mod interpretation;
pub mod reading_session;

pub use card::{Card, ReadingCard, SpreadPosition};
pub use interpretation::{Interpretation, MessageSource};
pub use reading_session::{
    Notice, NoticeLevel, PhaseTransition, ReadingSession, SessionView, WalletIdentity,
    SPREAD_SIZE,
};
