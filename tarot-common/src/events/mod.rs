//! Event types for the tarot services
//!
//! Provides shared event definitions and the EventBus used for in-process
//! fan-out (reading pipeline → coordinators) and for SSE transmission.

mod reading_types;

pub use reading_types::{ReadingPhase, WebhookResponse};

use crate::config::Environment;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tarot event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TarotEvent {
    /// Authoritative reading answer resolved
    ///
    /// Triggers:
    /// - Coordinator: reconcile selected cards
    /// - SSE: refresh reading view
    ReadingReady {
        /// Request the answer belongs to
        request_id: Uuid,
        /// Final (clamped) response
        response: WebhookResponse,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reading request failed
    ///
    /// Triggers:
    /// - Coordinator: store error, toast while preparing/selecting
    ReadingError {
        /// Request that failed
        request_id: Uuid,
        /// Error message
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Webhook environment switched
    ///
    /// Triggers:
    /// - Webhook client: swap URL set
    EnvironmentChanged {
        environment: Environment,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session phase changed
    PhaseChanged {
        /// Session generation (bumped on every reset)
        session_generation: u64,
        old_phase: ReadingPhase,
        new_phase: ReadingPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Wallet logged in through the login webhook
    WalletConnected {
        wallet: String,
        user_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Wallet identity dropped
    WalletDisconnected {
        wallet: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TarotEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            TarotEvent::ReadingReady { .. } => "ReadingReady",
            TarotEvent::ReadingError { .. } => "ReadingError",
            TarotEvent::EnvironmentChanged { .. } => "EnvironmentChanged",
            TarotEvent::PhaseChanged { .. } => "PhaseChanged",
            TarotEvent::WalletConnected { .. } => "WalletConnected",
            TarotEvent::WalletDisconnected { .. } => "WalletDisconnected",
        }
    }

    /// Reading request this event refers to, if any
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            TarotEvent::ReadingReady { request_id, .. }
            | TarotEvent::ReadingError { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Events emitted before a subscription are not delivered to it; listeners that
/// attach late must poll for state they may have missed.
///
/// # Examples
///
/// ```
/// use tarot_common::events::{EventBus, TarotEvent};
/// use tarot_common::Environment;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(TarotEvent::EnvironmentChanged {
///     environment: Environment::Production,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "EnvironmentChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TarotEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TarotEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TarotEvent,
    ) -> Result<usize, broadcast::error::SendError<TarotEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TarotEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_event(request_id: Uuid) -> TarotEvent {
        TarotEvent::ReadingReady {
            request_id,
            response: WebhookResponse {
                selected_card_indices: vec![7, 2, 15],
                message: Some("The tower falls so the star may rise".to_string()),
                question: Some("Will the launch succeed?".to_string()),
                is_temporary: false,
                deck: None,
            },
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(10);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(ready_event(Uuid::new_v4())).is_err());
        // Lossy variant never fails
        bus.emit_lossy(ready_event(Uuid::new_v4()));
    }

    #[test]
    fn test_eventbus_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let request_id = Uuid::new_v4();

        bus.emit(ready_event(request_id)).expect("emit should succeed");

        let r1 = rx1.try_recv().expect("rx1 should receive");
        let r2 = rx2.try_recv().expect("rx2 should receive");
        assert_eq!(r1.request_id(), Some(request_id));
        assert_eq!(r2.request_id(), Some(request_id));
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new(10);
        let _early = bus.subscribe();
        bus.emit_lossy(ready_event(Uuid::new_v4()));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn test_event_serialization_uses_type_tag() {
        let event = TarotEvent::ReadingError {
            request_id: Uuid::nil(),
            error: "HTTP 502".to_string(),
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).expect("Event serialization should succeed");
        assert!(json.contains("\"type\":\"ReadingError\""));
        assert!(json.contains("\"error\":\"HTTP 502\""));

        let back: TarotEvent = serde_json::from_str(&json).expect("Event deserialization should succeed");
        assert_eq!(back.event_type(), "ReadingError");
    }

    #[test]
    fn test_request_id_only_on_reading_events() {
        let env_event = TarotEvent::EnvironmentChanged {
            environment: Environment::Development,
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(env_event.request_id(), None);

        let id = Uuid::new_v4();
        assert_eq!(ready_event(id).request_id(), Some(id));
    }
}
