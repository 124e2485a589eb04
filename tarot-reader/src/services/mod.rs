//! Services for the tarot reading coordinator
//!
//! Leaves first: deck catalog, session store, environment settings, webhook
//! log and client, then the reading pipeline, account calls, interpretation
//! assembler and the session coordinator on top.

pub mod account;
pub mod deck_catalog;
pub mod environment;
pub mod interpretation;
pub mod mock_data;
pub mod payload;
pub mod reading_pipeline;
pub mod session_coordinator;
pub mod session_store;
pub mod webhook_client;
pub mod webhook_log;

pub use account::{AccountError, AccountService};
pub use deck_catalog::{Deck, DeckCatalog, DEFAULT_DECK};
pub use environment::{EnvironmentSettings, WebhookEndpoint};
pub use interpretation::{card_interpretation, generate_interpretation, InterpretationSource};
pub use mock_data::{MockProvider, StoreMockProvider};
pub use payload::PayloadError;
pub use reading_pipeline::{
    PipelineError, ReadingRequest, ReadingRequestRegistry, ReadingTicket, PLACEHOLDER_MESSAGE,
};
pub use session_coordinator::{
    connect_wallet, schedule_card_pool, select_deck, spawn_event_listener, CoordinatorError,
    ReadingCoordinator,
};
pub use session_store::SessionStore;
pub use webhook_client::{
    HttpMethod, ReqwestTransport, TransportError, TransportRequest, TransportResponse,
    WebhookBody, WebhookClient, WebhookError, WebhookReply, WebhookTransport,
    DEFAULT_THROTTLE_WINDOW,
};
pub use webhook_log::{CallOutcome, WebhookLog, WebhookLogEntry};
