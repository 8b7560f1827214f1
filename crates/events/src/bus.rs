//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`CatalogEvent`]s. The
//! presentation layer subscribes and turns events into transient
//! notifications; tests subscribe to observe every success and failure.
//! It is designed to be shared via `Arc<EventBus>`.

use serde::{Deserialize, Serialize};
use sref_core::types::{ItemId, PrincipalId, Timestamp};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// CatalogEvent
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CatalogLoaded,
    CatalogCleared,
    CatalogImported,
    CatalogExported,
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    SignedIn,
    SignedUp,
    SignedOut,
    OperationFailed,
}

impl EventKind {
    pub fn severity(self) -> Severity {
        match self {
            EventKind::OperationFailed => Severity::Error,
            EventKind::CatalogLoaded | EventKind::CatalogCleared => Severity::Info,
            _ => Severity::Success,
        }
    }
}

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// A catalog or session event with a human-readable message.
///
/// Constructed via [`CatalogEvent::new`] or [`CatalogEvent::failure`] and
/// enriched with [`with_item`](CatalogEvent::with_item) and
/// [`with_actor`](CatalogEvent::with_actor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvent {
    pub kind: EventKind,

    pub severity: Severity,

    /// Text suitable for a toast, e.g. `"Item added successfully"`.
    pub message: String,

    /// Item the event is about, if any.
    pub item_id: Option<ItemId>,

    /// Principal that triggered the event, if any.
    pub actor: Option<PrincipalId>,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl CatalogEvent {
    /// Create an event whose severity follows from its kind.
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            item_id: None,
            actor: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create an [`EventKind::OperationFailed`] event.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(EventKind::OperationFailed, message)
    }

    pub fn with_item(mut self, id: ItemId) -> Self {
        self.item_id = Some(id);
        self
    }

    pub fn with_actor(mut self, actor: Option<PrincipalId>) -> Self {
        self.actor = actor;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Error
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use sref_events::{CatalogEvent, EventBus, EventKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(CatalogEvent::new(EventKind::ItemCreated, "Item added successfully"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<CatalogEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: CatalogEvent) {
        tracing::trace!(kind = ?event.kind, message = %event.message, "Publishing catalog event");
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to every event published from now on. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = CatalogEvent::new(EventKind::ItemDeleted, "Item deleted successfully")
            .with_item(ItemId::new("sr-1"))
            .with_actor(Some(PrincipalId::new("user-7")));

        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, EventKind::ItemDeleted);
        assert_eq!(received.severity, Severity::Success);
        assert_eq!(received.item_id, Some(ItemId::new("sr-1")));
        assert_eq!(received.actor, Some(PrincipalId::new("user-7")));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(CatalogEvent::failure("Failed to load items"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");

        assert!(e1.is_failure());
        assert_eq!(e2.message, "Failed to load items");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(CatalogEvent::new(EventKind::CatalogLoaded, "orphan"));
    }

    #[test]
    fn dropping_receiver_unsubscribes() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn severity_follows_kind() {
        assert_eq!(EventKind::OperationFailed.severity(), Severity::Error);
        assert_eq!(EventKind::ItemCreated.severity(), Severity::Success);
        assert_eq!(EventKind::CatalogLoaded.severity(), Severity::Info);
    }
}
