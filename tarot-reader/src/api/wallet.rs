//! Wallet endpoints
//!
//! POST /wallet/connect, POST /wallet/disconnect

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    models::{SessionView, WalletIdentity},
    services::{self, CoordinatorError},
    AppState,
};

fn default_wallet_type() -> String {
    "unknown".to_string()
}

/// POST /wallet/connect request
#[derive(Debug, Deserialize)]
pub struct ConnectWalletRequest {
    pub wallet: String,
    #[serde(default = "default_wallet_type")]
    pub wallet_type: String,
}

/// POST /wallet/connect
pub async fn connect_wallet(
    State(state): State<AppState>,
    Json(request): Json<ConnectWalletRequest>,
) -> ApiResult<Json<WalletIdentity>> {
    let result =
        services::connect_wallet(&state.coordinator, &request.wallet, &request.wallet_type).await;

    match result {
        Ok(identity) => Ok(Json(identity)),
        Err(e) => {
            if matches!(e, CoordinatorError::Account(_)) {
                state.record_error(format!("Wallet login failed: {}", e)).await;
            }
            Err(e.into())
        }
    }
}

/// POST /wallet/disconnect
pub async fn disconnect_wallet(State(state): State<AppState>) -> Json<SessionView> {
    let mut coordinator = state.coordinator.lock().await;
    coordinator.disconnect_wallet();
    Json(coordinator.snapshot())
}

pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/wallet/connect", post(connect_wallet))
        .route("/wallet/disconnect", post(disconnect_wallet))
}
