//! Account webhooks
//!
//! Login (wallet → user id) and deck selection. Deck selection success is
//! judged by HTTP status alone; the body is ignored.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::environment::WebhookEndpoint;
use super::payload::{parse_login_reply, PayloadError};
use super::webhook_client::{WebhookClient, WebhookError};
use crate::models::WalletIdentity;

/// Account errors
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Wallet address is required")]
    MissingWallet,

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Malformed login reply: {0}")]
    Payload(#[from] PayloadError),
}

/// Login and deck-select calls
pub struct AccountService {
    client: Arc<WebhookClient>,
}

impl AccountService {
    pub fn new(client: Arc<WebhookClient>) -> Self {
        Self { client }
    }

    /// Exchange a wallet address for a user identity
    pub async fn login(
        &self,
        wallet: &str,
        wallet_type: &str,
    ) -> Result<WalletIdentity, AccountError> {
        let wallet = wallet.trim();
        if wallet.is_empty() {
            return Err(AccountError::MissingWallet);
        }

        let payload = json!({
            "date": Utc::now().to_rfc3339(),
            "wallet": wallet,
            "walletType": wallet_type,
        });

        let reply = self
            .client
            .call_endpoint(WebhookEndpoint::Login, &payload)
            .await?;
        let login = match parse_login_reply(&reply.body) {
            Ok(login) => login,
            Err(e) => {
                warn!(error = %e, "Login reply could not be parsed");
                return Err(e.into());
            }
        };

        info!(user_id = %login.user_id, runs_today = login.runs_today, mocked = reply.mocked, "Wallet logged in");

        Ok(WalletIdentity {
            wallet: wallet.to_string(),
            wallet_type: wallet_type.to_string(),
            user_id: login.user_id,
            runs_today: login.runs_today,
        })
    }

    /// Tell the backend which deck the user chose
    pub async fn select_deck(&self, user_id: &str, deck: &str) -> Result<(), AccountError> {
        let payload = json!({
            "date": Utc::now().to_rfc3339(),
            "userid": user_id,
            "deck_to_select": deck,
        });

        self.client
            .call_endpoint(WebhookEndpoint::DeckSelect, &payload)
            .await?;
        info!(user_id, deck, "Deck selection confirmed");
        Ok(())
    }
}
