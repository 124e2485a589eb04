//! HTTP API handlers for tarot-reader
//!
//! REST routes drive the reading coordinator; `/events` streams bus events
//! over SSE.

pub mod decks;
pub mod environment;
pub mod health;
pub mod reading;
pub mod sse;
pub mod wallet;
pub mod webhook_logs;

pub use decks::deck_routes;
pub use environment::environment_routes;
pub use health::health_routes;
pub use reading::reading_routes;
pub use sse::event_stream;
pub use wallet::wallet_routes;
pub use webhook_logs::webhook_log_routes;
