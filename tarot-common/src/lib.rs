//! # Tarot Common Library
//!
//! Shared code for the tarot reading services:
//! - Error type
//! - Event types (TarotEvent enum) and the EventBus
//! - Reading data types carried on events
//! - TOML configuration and environment selection

pub mod config;
pub mod error;
pub mod events;

pub use config::Environment;
pub use error::{Error, Result};
