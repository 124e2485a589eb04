//! Scripted webhook transport
//!
//! Replies are looked up by URL suffix ("reading", "login", "deck-select").
//! A gated transport holds calls to one endpoint until the test releases them.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tarot_reader::services::{
    TransportError, TransportRequest, TransportResponse, WebhookTransport,
};
use tokio::sync::Semaphore;

/// Scripted reply for one endpoint
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, String),
    Fail(String),
}

pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<TransportRequest>>,
    gate: Option<(String, Arc<Semaphore>)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Transport whose reading calls block until `gate.add_permits(n)`
    pub fn gated() -> (Self, Arc<Semaphore>) {
        Self::gated_on("reading")
    }

    /// Transport whose calls to `url_suffix` block until released
    pub fn gated_on(url_suffix: &str) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Self {
            gate: Some((url_suffix.to_string(), gate.clone())),
            ..Self::new()
        };
        (transport, gate)
    }

    pub fn reply(&self, url_suffix: &str, reply: Reply) {
        self.replies.lock().insert(url_suffix.to_string(), reply);
    }

    pub fn calls_to(&self, url_suffix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.url.ends_with(url_suffix))
            .count()
    }

    pub fn requests_to(&self, url_suffix: &str) -> Vec<TransportRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.url.ends_with(url_suffix))
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        self.calls.lock().push(request);

        if let Some((suffix, gate)) = &self.gate {
            if url.ends_with(suffix.as_str()) {
                gate.acquire()
                    .await
                    .map_err(|e| TransportError(e.to_string()))?
                    .forget();
            }
        }

        let reply = self
            .replies
            .lock()
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Json(status, body)) => Ok(TransportResponse {
                status,
                content_type: Some("application/json".to_string()),
                body: body.to_string(),
            }),
            Some(Reply::Text(status, body)) => Ok(TransportResponse {
                status,
                content_type: Some("text/plain".to_string()),
                body,
            }),
            Some(Reply::Fail(message)) => Err(TransportError(message)),
            None => Err(TransportError(format!("connection refused: {}", url))),
        }
    }
}
