//! Application state builders

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tarot_common::config::TomlConfig;
use tarot_common::Environment;
use tarot_reader::services::{connect_wallet, ReadingCoordinator};
use tarot_reader::AppState;

use super::scripted_transport::{Reply, ScriptedTransport};

/// Config with mock fallback off and no preparation delay
pub fn test_config(environment: Environment) -> TomlConfig {
    TomlConfig {
        environment,
        mock_fallback: false,
        preparation_delay_ms: 0,
        ..TomlConfig::default()
    }
}

/// State over a scripted transport with the event listener running
pub fn test_state(config: &TomlConfig, transport: Arc<ScriptedTransport>) -> AppState {
    let state = AppState::new(config, transport).expect("Failed to build app state");
    state.start_event_listener();
    state
}

/// State with a wallet already connected as `user-1`
pub async fn connected_state(config: &TomlConfig, transport: Arc<ScriptedTransport>) -> AppState {
    transport.reply(
        "login",
        Reply::Json(200, json!([{ "userid": "user-1", "runs_today": false }])),
    );
    let state = test_state(config, transport);
    connect_wallet(&state.coordinator, "0xabc", "metamask")
        .await
        .expect("Wallet connect failed");
    state
}

/// Wait until `check` holds for the coordinator, panicking after ~2 s
pub async fn eventually<F>(state: &AppState, mut check: F)
where
    F: FnMut(&ReadingCoordinator) -> bool,
{
    for _ in 0..200 {
        if check(&*state.coordinator.lock().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Condition not reached in time");
}
