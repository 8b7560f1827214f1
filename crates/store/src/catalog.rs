//! The catalog store: single source of truth for the item collection and
//! the view/filter state.
//!
//! Every create/update/delete goes through the [`ItemGateway`] first and is
//! applied locally only once the backend confirmed it. State lives in a
//! `watch` channel of immutable [`CatalogState`] snapshots: each transition
//! builds a new snapshot and swaps it in, so readers never see a partial
//! update. Subscribing to [`CatalogStore::watch`] is the observer interface;
//! dropping the receiver unsubscribes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sref_core::error::{CoreError, CoreResult};
use sref_core::item::{Item, ItemDraft, ItemPatch};
use sref_core::state::{CatalogAction, CatalogState, ViewMode};
use sref_core::transfer::{self, TransferError};
use sref_core::types::{ItemId, Principal, PrincipalId};
use sref_events::{CatalogEvent, EventBus, EventKind, RemoteChange};
use tokio::sync::{broadcast, watch};

use crate::config::{CatalogMode, StoreConfig};
use crate::gateway::ItemGateway;

pub struct CatalogStore {
    gateway: Arc<dyn ItemGateway>,
    events: Arc<EventBus>,
    config: StoreConfig,
    state: watch::Sender<Arc<CatalogState>>,
    principal: watch::Sender<Option<Principal>>,
    /// Items with a create/update/delete awaiting the backend.
    in_flight: Mutex<HashSet<ItemId>>,
    /// Bumped whenever the principal changes. Remote results that started
    /// under an older epoch are reported but not applied.
    epoch: AtomicU64,
}

impl CatalogStore {
    /// Create an empty store. Call [`load`](Self::load) to populate it.
    pub fn new(gateway: Arc<dyn ItemGateway>, events: Arc<EventBus>, config: StoreConfig) -> Self {
        let (state, _) = watch::channel(Arc::new(CatalogState::new()));
        let (principal, _) = watch::channel(None);
        Self {
            gateway,
            events,
            config,
            state,
            principal,
            in_flight: Mutex::new(HashSet::new()),
            epoch: AtomicU64::new(0),
        }
    }

    // ---- observation ----------------------------------------------------

    /// The current state. The snapshot never changes after it is returned.
    pub fn snapshot(&self) -> Arc<CatalogState> {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn watch(&self) -> watch::Receiver<Arc<CatalogState>> {
        self.state.subscribe()
    }

    /// Subscribe to success/failure notifications.
    pub fn events(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    pub fn mode(&self) -> CatalogMode {
        self.config.mode
    }

    /// The principal the catalog is currently loaded for.
    pub fn principal(&self) -> Option<Principal> {
        self.principal.borrow().clone()
    }

    /// Items matching the current search query and selected tags.
    pub fn filtered_items(&self) -> Vec<Item> {
        self.snapshot().filtered_items().into_iter().cloned().collect()
    }

    /// Sorted, deduplicated vocabulary of every tag in the catalog.
    pub fn all_tags(&self) -> Vec<String> {
        self.snapshot().all_tags()
    }

    pub fn get(&self, id: &ItemId) -> Option<Item> {
        self.snapshot().item(id).cloned()
    }

    /// Push-change subscription of the underlying gateway, if it has one.
    pub fn gateway_changes(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        self.gateway.subscribe_changes()
    }

    // ---- lifecycle -------------------------------------------------------

    /// Fetch the item set visible to `principal` and replace local items
    /// with it.
    ///
    /// In private mode with no principal the catalog becomes empty without
    /// contacting the backend. On failure local items are left untouched.
    pub async fn load(&self, principal: Option<&Principal>) -> CoreResult<usize> {
        let result = self.try_load(principal).await;
        self.report(
            result,
            |count| CatalogEvent::new(EventKind::CatalogLoaded, format!("Loaded {count} items")),
            "Failed to load items",
            None,
        )
    }

    async fn try_load(&self, principal: Option<&Principal>) -> CoreResult<usize> {
        self.switch_principal(principal.cloned());
        self.refresh(self.current_epoch()).await
    }

    /// List the items visible to the current principal and apply them,
    /// unless the principal changed after `epoch`.
    async fn refresh(&self, epoch: u64) -> CoreResult<usize> {
        let owner = match (self.config.mode, self.principal_id()) {
            (CatalogMode::Private, None) => {
                if self.is_current(epoch) {
                    self.dispatch(CatalogAction::SetItems(Vec::new()));
                }
                return Ok(0);
            }
            (CatalogMode::Private, Some(id)) => Some(id),
            _ => None,
        };

        tracing::debug!(mode = %self.config.mode, owner = ?owner, "Loading catalog");
        let items = self.gateway.list(owner.as_ref()).await?;
        let count = items.len();

        if self.is_current(epoch) {
            self.dispatch(CatalogAction::SetItems(items));
        } else {
            tracing::debug!("Discarding catalog fetched for a previous session");
        }
        Ok(count)
    }

    /// React to the identity resolver's principal changing: reload the
    /// catalog or, in private mode, clear it on sign-out.
    pub async fn on_identity_changed(&self, principal: Option<Principal>) -> CoreResult<()> {
        match (self.config.mode, principal) {
            (CatalogMode::Local, _) => Ok(()),
            (CatalogMode::Private, None) => {
                self.switch_principal(None);
                self.reset();
                self.events.publish(CatalogEvent::new(
                    EventKind::CatalogCleared,
                    "Signed out, catalog cleared",
                ));
                Ok(())
            }
            (_, principal) => self.load(principal.as_ref()).await.map(|_| ()),
        }
    }

    /// Drop all items, filters and selection.
    pub fn reset(&self) {
        self.dispatch(CatalogAction::Reset);
    }

    // ---- remote-backed mutations -----------------------------------------

    /// Validate and persist a new item, then prepend the confirmed record.
    pub async fn create(&self, draft: ItemDraft) -> CoreResult<Item> {
        let result = self.try_create(draft).await;
        self.report(
            result,
            |item| {
                CatalogEvent::new(EventKind::ItemCreated, "Item added successfully")
                    .with_item(item.id.clone())
            },
            "Failed to add item",
            None,
        )
    }

    async fn try_create(&self, draft: ItemDraft) -> CoreResult<Item> {
        let draft = draft.normalized()?;

        let owner = if self.config.mode.enforces_ownership() {
            Some(self.require_principal("add items")?)
        } else {
            None
        };

        let epoch = self.current_epoch();
        tracing::debug!(code = %draft.code, "Creating item");
        let item = self.gateway.insert(&draft, owner.as_ref()).await?;

        if self.is_current(epoch) {
            self.dispatch(CatalogAction::AddItem(item.clone()));
        }
        tracing::info!(item_id = %item.id, code = %item.code, "Item created");
        Ok(item)
    }

    /// Persist new field values for an existing item.
    ///
    /// `id`, `created_at` and the owner are taken from the stored item; only
    /// the editable fields of `item` are used. The caller must own the item.
    pub async fn update(&self, item: Item) -> CoreResult<Item> {
        let id = item.id.clone();
        let result = self.try_update(item).await;
        self.report(
            result,
            |item| {
                CatalogEvent::new(EventKind::ItemUpdated, "Item updated successfully")
                    .with_item(item.id.clone())
            },
            "Failed to update item",
            Some(&id),
        )
    }

    async fn try_update(&self, item: Item) -> CoreResult<Item> {
        let item = item.normalized()?;
        let _guard = self.begin(&item.id)?;

        let existing = self
            .get(&item.id)
            .ok_or_else(|| CoreError::item_not_found(&item.id))?;
        let owner = self.authorize(&existing)?;

        let patch = ItemPatch::from(&item);
        let mut updated = existing;
        updated.apply_patch(&patch);

        let epoch = self.current_epoch();
        tracing::debug!(item_id = %updated.id, "Updating item");
        self.gateway
            .update(&updated.id, &patch, owner.as_ref())
            .await
            .map_err(|e| e.for_item(&updated.id))?;

        if self.is_current(epoch) {
            self.dispatch(CatalogAction::UpdateItem(updated.clone()));
        }
        tracing::info!(item_id = %updated.id, "Item updated");
        Ok(updated)
    }

    /// Delete an item the caller owns. Clears the selection if it pointed at
    /// the deleted item.
    pub async fn delete(&self, id: &ItemId) -> CoreResult<()> {
        let result = self.try_delete(id).await;
        self.report(
            result,
            |_| CatalogEvent::new(EventKind::ItemDeleted, "Item deleted successfully").with_item(id.clone()),
            "Failed to delete item",
            Some(id),
        )
    }

    async fn try_delete(&self, id: &ItemId) -> CoreResult<()> {
        let _guard = self.begin(id)?;

        let existing = self.get(id).ok_or_else(|| CoreError::item_not_found(id))?;
        let owner = self.authorize(&existing)?;

        let epoch = self.current_epoch();
        tracing::debug!(item_id = %id, "Deleting item");
        self.gateway
            .delete(id, owner.as_ref())
            .await
            .map_err(|e| e.for_item(id))?;

        if self.is_current(epoch) {
            self.dispatch(CatalogAction::DeleteItem(id.clone()));
        }
        tracing::info!(item_id = %id, "Item deleted");
        Ok(())
    }

    // ---- export / import -------------------------------------------------

    /// Serialize the current items as an export document.
    pub fn export_json(&self) -> CoreResult<String> {
        Ok(transfer::export_items(&self.snapshot().items)?)
    }

    /// Write the export document into `dir` under a dated file name and
    /// return the full path.
    pub async fn export_to_dir(&self, dir: &Path) -> CoreResult<PathBuf> {
        let path = dir.join(transfer::export_file_name(chrono::Local::now().date_naive()));
        self.export_to_path(&path).await?;
        Ok(path)
    }

    pub async fn export_to_path(&self, path: &Path) -> CoreResult<()> {
        let result = self.try_export(path).await;
        self.report(
            result,
            |_| CatalogEvent::new(EventKind::CatalogExported, "Data exported successfully"),
            "Failed to export data",
            None,
        )
    }

    async fn try_export(&self, path: &Path) -> CoreResult<()> {
        let json = self.export_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(TransferError::from)?;
        tracing::info!(path = %path.display(), "Catalog exported");
        Ok(())
    }

    /// Replace the catalog with the contents of an export file.
    ///
    /// The file is validated completely before anything changes; one bad
    /// entry rejects the batch. When ownership is enforced only the caller's
    /// own items are replaced: unowned entries are claimed for the caller and
    /// an entry owned by someone else rejects the batch. The catalog is then
    /// reloaded in the current scope.
    pub async fn import_file(&self, path: &Path) -> CoreResult<usize> {
        let result = self.try_import(path).await;
        self.report(
            result,
            |count| {
                CatalogEvent::new(EventKind::CatalogImported, format!("Imported {count} items"))
            },
            "Failed to import data",
            None,
        )
    }

    async fn try_import(&self, path: &Path) -> CoreResult<usize> {
        let owner = if self.config.mode.enforces_ownership() {
            Some(self.require_principal("import data")?)
        } else {
            None
        };
        let epoch = self.current_epoch();

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(TransferError::from)?;
        let mut items = transfer::import_items(&contents)?;
        if let Some(owner) = &owner {
            claim_entries(&mut items, owner)?;
        }
        let count = items.len();

        self.gateway.replace_all(&items, owner.as_ref()).await?;
        self.refresh(epoch).await?;
        tracing::info!(path = %path.display(), count, "Catalog imported");
        Ok(count)
    }

    // ---- push changes ----------------------------------------------------

    /// Fold a change made by another session into local state.
    ///
    /// In private mode, changes to rows owned by someone else are ignored.
    /// An insert of an id already present is applied as an update.
    pub fn apply_remote_change(&self, change: RemoteChange) {
        if let Some(item) = change.item() {
            if !self.in_scope(item) {
                tracing::trace!(item_id = %item.id, "Ignoring change outside the current scope");
                return;
            }
        }

        tracing::debug!(item_id = %change.item_id(), "Applying remote change");
        let action = match change {
            RemoteChange::Inserted(item) | RemoteChange::Updated(item) => {
                CatalogAction::AddItem(item)
            }
            RemoteChange::Deleted(id) => CatalogAction::DeleteItem(id),
        };
        self.dispatch(action);
    }

    // ---- local view state ------------------------------------------------

    pub fn set_search_query(&self, text: impl Into<String>) {
        self.dispatch(CatalogAction::SetSearchQuery(text.into()));
    }

    pub fn toggle_tag(&self, tag: impl Into<String>) {
        self.dispatch(CatalogAction::ToggleTag(tag.into()));
    }

    pub fn clear_tags(&self) {
        self.dispatch(CatalogAction::ClearTags);
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.dispatch(CatalogAction::SetViewMode(mode));
    }

    /// Select an item by id, or clear the selection. Ids not in the catalog
    /// clear it too.
    pub fn set_selected_item(&self, id: Option<&ItemId>) {
        self.dispatch(CatalogAction::SetSelectedItem(id.cloned()));
    }

    pub fn toggle_add_modal(&self) {
        self.dispatch(CatalogAction::ToggleAddModal);
    }

    // ---- helpers ---------------------------------------------------------

    fn dispatch(&self, action: CatalogAction) {
        self.state
            .send_modify(|state| *state = Arc::new(state.apply(action)));
    }

    fn principal_id(&self) -> Option<PrincipalId> {
        self.principal.borrow().as_ref().map(|p| p.id.clone())
    }

    fn require_principal(&self, action: &str) -> CoreResult<PrincipalId> {
        self.principal_id()
            .ok_or_else(|| CoreError::Unauthorized(format!("sign in to {action}")))
    }

    /// Owner filter for a mutation of `existing`, or an authorization error.
    fn authorize(&self, existing: &Item) -> CoreResult<Option<PrincipalId>> {
        if !self.config.mode.enforces_ownership() {
            return Ok(None);
        }
        let principal = self.require_principal("modify items")?;
        if !existing.is_owned_by(&principal) {
            return Err(CoreError::Forbidden(format!(
                "item {} belongs to another user",
                existing.id
            )));
        }
        Ok(Some(principal))
    }

    fn in_scope(&self, item: &Item) -> bool {
        match self.config.mode {
            CatalogMode::Private => self
                .principal_id()
                .is_some_and(|principal| item.is_owned_by(&principal)),
            CatalogMode::Local | CatalogMode::Shared => true,
        }
    }

    fn switch_principal(&self, principal: Option<Principal>) {
        let changed = self.principal.send_if_modified(|current| {
            if *current == principal {
                false
            } else {
                *current = principal;
                true
            }
        });
        if changed {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    /// Mark `id` busy until the returned guard is dropped.
    fn begin(&self, id: &ItemId) -> CoreResult<InFlightGuard<'_>> {
        if !lock(&self.in_flight).insert(id.clone()) {
            return Err(CoreError::Conflict(format!(
                "an operation on item {id} is already in progress"
            )));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            id: id.clone(),
        })
    }

    /// Publish the outcome of an operation and hand it back to the caller.
    fn report<T>(
        &self,
        result: CoreResult<T>,
        success: impl FnOnce(&T) -> CatalogEvent,
        failure: &str,
        item: Option<&ItemId>,
    ) -> CoreResult<T> {
        let actor = self.principal_id();
        match &result {
            Ok(value) => self.events.publish(success(value).with_actor(actor)),
            Err(err) => {
                if err.is_remote_failure() {
                    tracing::error!(error = %err, item_id = ?item, "{failure}");
                } else {
                    tracing::warn!(error = %err, item_id = ?item, "{failure}");
                }
                let mut event = CatalogEvent::failure(format!("{failure}: {err}")).with_actor(actor);
                if let Some(id) = item {
                    event = event.with_item(id.clone());
                }
                self.events.publish(event);
            }
        }
        result
    }
}

/// Stamp unowned entries with `owner`; entries of another owner are refused.
fn claim_entries(items: &mut [Item], owner: &PrincipalId) -> CoreResult<()> {
    for (index, item) in items.iter_mut().enumerate() {
        match &item.owner_id {
            None => item.owner_id = Some(owner.clone()),
            Some(existing) if existing == owner => {}
            Some(_) => {
                return Err(CoreError::Forbidden(format!(
                    "entry {index} ({}) belongs to another user",
                    item.id
                )))
            }
        }
    }
    Ok(())
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ItemId>>,
    id: ItemId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
