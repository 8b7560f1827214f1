//! Push-change envelopes delivered by a persistence backend.
//!
//! A backend that can notify sessions of rows changed elsewhere publishes
//! [`RemoteChange`]s on a [`ChangeFeed`]; each catalog store subscribes and
//! folds them into its local state.

use serde::{Deserialize, Serialize};
use sref_core::item::Item;
use sref_core::types::ItemId;
use tokio::sync::broadcast;

/// A row-level change observed on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum RemoteChange {
    Inserted(Item),
    Updated(Item),
    Deleted(ItemId),
}

impl RemoteChange {
    /// Id of the row the change is about.
    pub fn item_id(&self) -> &ItemId {
        match self {
            RemoteChange::Inserted(item) | RemoteChange::Updated(item) => &item.id,
            RemoteChange::Deleted(id) => id,
        }
    }

    /// The full record, when the change carries one.
    pub fn item(&self) -> Option<&Item> {
        match self {
            RemoteChange::Inserted(item) | RemoteChange::Updated(item) => Some(item),
            RemoteChange::Deleted(_) => None,
        }
    }
}

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub for [`RemoteChange`]s.
pub struct ChangeFeed {
    sender: broadcast::Sender<RemoteChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a change to every current subscriber.
    pub fn publish(&self, change: RemoteChange) {
        tracing::trace!(item_id = %change.item_id(), "Publishing remote change");
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteChange> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
