//! In-process item gateway, optionally persisted to a single JSON file.
//!
//! Used when no remote service is configured. The file holds the serialized
//! item array; it is read once by [`LocalGateway::open`] and rewritten after
//! every successful mutation (write to a sibling temp file, then rename).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sref_core::item::{Item, ItemDraft, ItemPatch};
use sref_core::types::{ItemId, PrincipalId};
use sref_events::{ChangeFeed, RemoteChange};
use tokio::sync::{broadcast, Mutex};

use crate::gateway::{GatewayError, ItemGateway};

/// File name used when no data file is configured.
pub const DEFAULT_DATA_FILE: &str = "sref-gallery-items.json";

pub struct LocalGateway {
    /// Newest first.
    items: Mutex<Vec<Item>>,
    path: Option<PathBuf>,
    changes: ChangeFeed,
}

impl LocalGateway {
    /// A gateway that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::with_items(Vec::new())
    }

    /// An in-memory gateway seeded with `items` (newest first).
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items: Mutex::new(items),
            path: None,
            changes: ChangeFeed::default(),
        }
    }

    /// Load the item array from `path`. A missing file is an empty catalog;
    /// a file that does not parse is an error, so it is never overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let path = path.into();
        let items = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str::<Vec<Item>>(&contents).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse saved items");
                GatewayError::Unavailable(format!("{} is not a valid item file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        tracing::info!(path = %path.display(), count = items.len(), "Opened local catalog");
        Ok(Self {
            items: Mutex::new(items),
            path: Some(path),
            changes: ChangeFeed::default(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write `items` to the backing file, if there is one.
    async fn persist(&self, items: &[Item]) -> Result<(), GatewayError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(items)
            .map_err(|e| GatewayError::Unavailable(format!("failed to serialize items: {e}")))?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| io_error(path, e))?;

        tracing::trace!(path = %path.display(), count = items.len(), "Saved local catalog");
        Ok(())
    }
}

#[async_trait]
impl ItemGateway for LocalGateway {
    async fn list(&self, owner: Option<&PrincipalId>) -> Result<Vec<Item>, GatewayError> {
        let items = self.items.lock().await;
        Ok(items
            .iter()
            .filter(|item| visible_to(item, owner))
            .cloned()
            .collect())
    }

    async fn insert(
        &self,
        draft: &ItemDraft,
        owner: Option<&PrincipalId>,
    ) -> Result<Item, GatewayError> {
        let item = Item::from_draft(ItemId::generate(), Utc::now(), draft.clone(), owner.cloned());

        let mut items = self.items.lock().await;
        let mut next = Vec::with_capacity(items.len() + 1);
        next.push(item.clone());
        next.extend(items.iter().cloned());
        self.persist(&next).await?;
        *items = next;

        self.changes.publish(RemoteChange::Inserted(item.clone()));
        Ok(item)
    }

    async fn update(
        &self,
        id: &ItemId,
        patch: &ItemPatch,
        owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError> {
        let mut items = self.items.lock().await;
        let index = position(&items, id, owner).ok_or(GatewayError::NotFound)?;

        let mut next = items.clone();
        next[index].apply_patch(patch);
        self.persist(&next).await?;
        let updated = next[index].clone();
        *items = next;

        self.changes.publish(RemoteChange::Updated(updated));
        Ok(())
    }

    async fn delete(&self, id: &ItemId, owner: Option<&PrincipalId>) -> Result<(), GatewayError> {
        let mut items = self.items.lock().await;
        let index = position(&items, id, owner).ok_or(GatewayError::NotFound)?;

        let mut next = items.clone();
        next.remove(index);
        self.persist(&next).await?;
        *items = next;

        self.changes.publish(RemoteChange::Deleted(id.clone()));
        Ok(())
    }

    async fn replace_all(
        &self,
        replacement: &[Item],
        owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError> {
        let mut items = self.items.lock().await;

        let next = match owner {
            None => replacement.to_vec(),
            Some(owner) => {
                if let Some(item) = replacement.iter().find(|i| !i.is_owned_by(owner)) {
                    return Err(GatewayError::Rejected {
                        status: 403,
                        message: format!("item {} is not owned by {owner}", item.id),
                    });
                }
                let kept: Vec<Item> = items
                    .iter()
                    .filter(|item| !item.is_owned_by(owner))
                    .cloned()
                    .collect();
                if let Some(taken) = kept
                    .iter()
                    .find(|row| replacement.iter().any(|i| i.id == row.id))
                {
                    return Err(GatewayError::Rejected {
                        status: 409,
                        message: format!("item {} belongs to another user", taken.id),
                    });
                }

                let mut next: Vec<Item> = replacement.iter().cloned().chain(kept).collect();
                next.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                next
            }
        };

        self.persist(&next).await?;
        *items = next;
        tracing::debug!(owner = ?owner, count = replacement.len(), "Replaced local catalog");
        Ok(())
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        Some(self.changes.subscribe())
    }
}

fn visible_to(item: &Item, owner: Option<&PrincipalId>) -> bool {
    owner.map_or(true, |owner| item.is_owned_by(owner))
}

/// Index of the row with `id`, treating rows of other owners as absent.
fn position(items: &[Item], id: &ItemId, owner: Option<&PrincipalId>) -> Option<usize> {
    items
        .iter()
        .position(|item| &item.id == id && visible_to(item, owner))
}

fn io_error(path: &Path, err: std::io::Error) -> GatewayError {
    GatewayError::Unavailable(format!("{}: {err}", path.display()))
}
