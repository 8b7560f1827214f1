//! Free-text search and tag filtering over the in-memory catalog.
//!
//! Pure functions over item slices; the store recomputes them on every read
//! instead of caching derived lists.

use std::collections::BTreeSet;

use crate::item::{Item, TagSet};

/// The active search/filter criteria.
#[derive(Debug, Clone)]
pub struct ItemFilter<'a> {
    query: Option<String>,
    required_tags: &'a TagSet,
}

impl<'a> ItemFilter<'a> {
    /// Build a filter from the raw query text and the selected tags.
    ///
    /// An empty query disables text matching.
    pub fn new(query: &str, required_tags: &'a TagSet) -> ItemFilter<'a> {
        ItemFilter {
            query: (!query.is_empty()).then(|| query.to_lowercase()),
            required_tags,
        }
    }

    /// `true` when the filter lets every item through.
    pub fn is_identity(&self) -> bool {
        self.query.is_none() && self.required_tags.is_empty()
    }

    /// An item matches iff the text query is a case-insensitive substring of
    /// its code, title, description or any tag, and it carries every
    /// required tag.
    pub fn matches(&self, item: &Item) -> bool {
        self.matches_query(item) && self.matches_tags(item)
    }

    fn matches_query(&self, item: &Item) -> bool {
        let Some(needle) = self.query.as_deref() else {
            return true;
        };
        let hit = |text: &str| text.to_lowercase().contains(needle);

        hit(&item.code)
            || hit(&item.title)
            || item.description.as_deref().is_some_and(hit)
            || item.tags.iter().any(hit)
    }

    fn matches_tags(&self, item: &Item) -> bool {
        self.required_tags.iter().all(|tag| item.tags.contains(tag))
    }

    /// Apply the filter, preserving the relative order of `items`.
    pub fn apply<'i>(&self, items: &'i [Item]) -> Vec<&'i Item> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

/// Every distinct tag across `items`, sorted lexicographically.
pub fn all_tags(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.tags.iter())
        .collect::<BTreeSet<&str>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
