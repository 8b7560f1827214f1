//! Catalog state and its pure transition function.
//!
//! [`CatalogState::apply`] never mutates in place: it returns a new state,
//! so a snapshot handed to a reader stays consistent while the store moves
//! on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::item::{Item, TagSet};
use crate::search::{all_tags, ItemFilter};
use crate::types::ItemId;

// ---------------------------------------------------------------------------
// ViewMode
// ---------------------------------------------------------------------------

/// How the collection is laid out by the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Grid => f.write_str("grid"),
            ViewMode::List => f.write_str("list"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(ViewMode::Grid),
            "list" => Ok(ViewMode::List),
            other => Err(CoreError::validation(
                "view_mode",
                format!("must be 'grid' or 'list', got '{other}'"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Every state transition the catalog supports.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogAction {
    /// Replace the whole collection (load, import).
    SetItems(Vec<Item>),
    /// Insert a confirmed item at the front. An item whose id is already
    /// present replaces the existing entry instead.
    AddItem(Item),
    UpdateItem(Item),
    DeleteItem(ItemId),
    SetSearchQuery(String),
    ToggleTag(String),
    ClearTags,
    SetViewMode(ViewMode),
    /// Select the item with this id, or clear the selection.
    SetSelectedItem(Option<ItemId>),
    ToggleAddModal,
    /// Drop all per-user data. The view mode survives.
    Reset,
}

// ---------------------------------------------------------------------------
// CatalogState
// ---------------------------------------------------------------------------

/// The whole in-memory catalog as seen by consumers.
///
/// Invariants kept by [`apply`](CatalogState::apply):
/// - item ids are unique,
/// - `selected_item`, when set, is the current version of an item in `items`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogState {
    /// Newest first.
    pub items: Vec<Item>,
    pub search_query: String,
    pub selected_tags: TagSet,
    pub view_mode: ViewMode,
    pub selected_item: Option<Item>,
    pub is_add_modal_open: bool,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the state that results from `action`.
    pub fn apply(&self, action: CatalogAction) -> CatalogState {
        let mut next = self.clone();
        match action {
            CatalogAction::SetItems(items) => {
                next.items = dedup_by_id(items);
                next.selected_item = next
                    .selected_item
                    .and_then(|selected| next.items.iter().find(|i| i.id == selected.id).cloned());
            }
            CatalogAction::AddItem(item) => {
                if let Some(existing) = next.items.iter_mut().find(|i| i.id == item.id) {
                    *existing = item.clone();
                    next.refresh_selection(&item);
                } else {
                    next.items.insert(0, item);
                }
            }
            CatalogAction::UpdateItem(item) => {
                if let Some(existing) = next.items.iter_mut().find(|i| i.id == item.id) {
                    *existing = item.clone();
                    next.refresh_selection(&item);
                }
            }
            CatalogAction::DeleteItem(id) => {
                next.items.retain(|i| i.id != id);
                if next.selected_item.as_ref().is_some_and(|s| s.id == id) {
                    next.selected_item = None;
                }
            }
            CatalogAction::SetSearchQuery(query) => next.search_query = query,
            CatalogAction::ToggleTag(tag) => {
                let tag = tag.trim();
                if !next.selected_tags.remove(tag) {
                    next.selected_tags.insert(tag);
                }
            }
            CatalogAction::ClearTags => next.selected_tags = TagSet::new(),
            CatalogAction::SetViewMode(mode) => next.view_mode = mode,
            CatalogAction::SetSelectedItem(id) => {
                next.selected_item =
                    id.and_then(|id| next.items.iter().find(|i| i.id == id).cloned());
            }
            CatalogAction::ToggleAddModal => next.is_add_modal_open = !next.is_add_modal_open,
            CatalogAction::Reset => {
                next = CatalogState {
                    view_mode: self.view_mode,
                    ..CatalogState::default()
                };
            }
        }
        next
    }

    /// Items matching the current search query and selected tags, in store
    /// order.
    pub fn filtered_items(&self) -> Vec<&Item> {
        ItemFilter::new(&self.search_query, &self.selected_tags).apply(&self.items)
    }

    /// Sorted, deduplicated tag vocabulary of the whole collection.
    pub fn all_tags(&self) -> Vec<String> {
        all_tags(&self.items)
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|i| &i.id == id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.item(id).is_some()
    }

    fn refresh_selection(&mut self, item: &Item) {
        if self.selected_item.as_ref().is_some_and(|s| s.id == item.id) {
            self.selected_item = Some(item.clone());
        }
    }
}

/// Keep the first occurrence of every id.
fn dedup_by_id(items: Vec<Item>) -> Vec<Item> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::item::ItemDraft;

    fn item(id: &str, title: &str, tags: &[&str]) -> Item {
        Item::from_draft(
            ItemId::new(id),
            Utc::now(),
            ItemDraft::new(format!("SR-{id}"), title).with_tags(tags.iter().copied()),
            None,
        )
    }

    fn loaded() -> CatalogState {
        CatalogState::new().apply(CatalogAction::SetItems(vec![
            item("1", "One", &["a"]),
            item("2", "Two", &["b"]),
        ]))
    }

    #[test]
    fn add_prepends() {
        let state = loaded().apply(CatalogAction::AddItem(item("3", "Three", &[])));
        let ids: Vec<_> = state.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn add_of_known_id_replaces_in_place() {
        let state = loaded().apply(CatalogAction::AddItem(item("2", "Two again", &[])));
        assert_eq!(state.items.len(), 2);
        assert_eq!(state.items[1].title, "Two again");
    }

    #[test]
    fn update_replaces_entry_and_selection() {
        let state = loaded().apply(CatalogAction::SetSelectedItem(Some(ItemId::new("1"))));
        let state = state.apply(CatalogAction::UpdateItem(item("1", "Renamed", &[])));

        assert_eq!(state.items.iter().filter(|i| i.id.as_str() == "1").count(), 1);
        assert_eq!(state.items[0].title, "Renamed");
        assert_eq!(state.selected_item.unwrap().title, "Renamed");
    }

    #[test]
    fn update_of_unknown_id_is_ignored() {
        let before = loaded();
        let after = before.apply(CatalogAction::UpdateItem(item("9", "Ghost", &[])));
        assert_eq!(before, after);
    }

    #[test]
    fn delete_clears_matching_selection() {
        let state = loaded().apply(CatalogAction::SetSelectedItem(Some(ItemId::new("2"))));
        let state = state.apply(CatalogAction::DeleteItem(ItemId::new("2")));
        assert!(!state.contains(&ItemId::new("2")));
        assert!(state.selected_item.is_none());
    }

    #[test]
    fn delete_keeps_unrelated_selection() {
        let state = loaded().apply(CatalogAction::SetSelectedItem(Some(ItemId::new("1"))));
        let state = state.apply(CatalogAction::DeleteItem(ItemId::new("2")));
        assert_eq!(state.selected_item.unwrap().id.as_str(), "1");
    }

    #[test]
    fn selecting_an_absent_item_clears_selection() {
        let state = loaded().apply(CatalogAction::SetSelectedItem(Some(ItemId::new("404"))));
        assert!(state.selected_item.is_none());
    }

    #[test]
    fn set_items_drops_selection_that_disappeared() {
        let state = loaded().apply(CatalogAction::SetSelectedItem(Some(ItemId::new("2"))));
        let state = state.apply(CatalogAction::SetItems(vec![item("1", "One", &[])]));
        assert!(state.selected_item.is_none());
    }

    #[test]
    fn set_items_deduplicates_ids() {
        let state = CatalogState::new().apply(CatalogAction::SetItems(vec![
            item("1", "First", &[]),
            item("1", "Shadow", &[]),
        ]));
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].title, "First");
    }

    #[test]
    fn toggle_tag_is_an_involution() {
        let start = loaded().apply(CatalogAction::ToggleTag("a".into()));
        let twice = start
            .apply(CatalogAction::ToggleTag("x".into()))
            .apply(CatalogAction::ToggleTag("x".into()));
        assert_eq!(start.selected_tags, twice.selected_tags);
    }

    #[test]
    fn toggle_tag_ignores_surrounding_whitespace() {
        let state = loaded()
            .apply(CatalogAction::ToggleTag(" x ".into()))
            .apply(CatalogAction::ToggleTag(" x ".into()));
        assert!(state.selected_tags.is_empty());
    }

    #[test]
    fn clear_tags_empties_selection() {
        let state = loaded()
            .apply(CatalogAction::ToggleTag("a".into()))
            .apply(CatalogAction::ToggleTag("b".into()))
            .apply(CatalogAction::ClearTags);
        assert!(state.selected_tags.is_empty());
    }

    #[test]
    fn filtered_items_follow_query_and_tags() {
        let state = loaded().apply(CatalogAction::SetSearchQuery("two".into()));
        let titles: Vec<_> = state.filtered_items().iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Two"]);

        let state = state
            .apply(CatalogAction::SetSearchQuery(String::new()))
            .apply(CatalogAction::ToggleTag("a".into()));
        let titles: Vec<_> = state.filtered_items().iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["One"]);
    }

    #[test]
    fn reset_keeps_view_mode_only() {
        let state = loaded()
            .apply(CatalogAction::SetViewMode(ViewMode::List))
            .apply(CatalogAction::SetSearchQuery("x".into()))
            .apply(CatalogAction::ToggleAddModal)
            .apply(CatalogAction::Reset);
        assert!(state.items.is_empty());
        assert!(state.search_query.is_empty());
        assert!(!state.is_add_modal_open);
        assert_eq!(state.view_mode, ViewMode::List);
    }

    #[test]
    fn apply_leaves_previous_snapshot_untouched() {
        let before = loaded();
        let _after = before.apply(CatalogAction::DeleteItem(ItemId::new("1")));
        assert_eq!(before.items.len(), 2);
    }

    #[test]
    fn view_mode_parses_case_insensitively() {
        assert_eq!("LIST".parse::<ViewMode>().unwrap(), ViewMode::List);
        assert_eq!("grid".parse::<ViewMode>().unwrap(), ViewMode::Grid);
        assert!("table".parse::<ViewMode>().is_err());
    }
}
