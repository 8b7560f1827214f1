//! The catalog's unit of record and the shapes used to create and edit it.
//!
//! JSON field names (`srefCode`, `imageUrl`, `createdAt`, `userId`) are part
//! of the export file format and must stay stable.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreResult;
use crate::types::{ItemId, PrincipalId, Timestamp};

// ---------------------------------------------------------------------------
// TagSet
// ---------------------------------------------------------------------------

/// Insertion-ordered set of tags.
///
/// Tags are trimmed, blank tags are dropped and duplicates keep their first
/// position. Deserialization goes through the same normalisation, so a
/// `TagSet` never holds duplicates no matter where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag. Returns `false` if it was blank or already present.
    pub fn insert(&mut self, tag: impl AsRef<str>) -> bool {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    /// Remove a tag. Returns `false` if it was not present.
    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| t != tag);
        self.0.len() != before
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        tags.into_iter().collect()
    }
}

impl From<TagSet> for Vec<String> {
    fn from(tags: TagSet) -> Self {
        tags.0
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One catalog entry: a style reference code plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,

    #[serde(rename = "srefCode")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub code: String,

    #[validate(length(min = 1, message = "must not be empty"))]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub tags: TagSet,

    /// Files written by hand may omit it; such entries are stamped with the
    /// time they are read.
    #[serde(default = "chrono::Utc::now")]
    pub created_at: Timestamp,

    /// Principal that created the item. Absent when running without
    /// authentication.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<PrincipalId>,
}

impl Item {
    /// Materialise a confirmed item from a draft.
    pub fn from_draft(
        id: ItemId,
        created_at: Timestamp,
        draft: ItemDraft,
        owner_id: Option<PrincipalId>,
    ) -> Self {
        Self {
            id,
            code: draft.code,
            title: draft.title,
            description: draft.description,
            image_url: draft.image_url,
            tags: draft.tags,
            created_at,
            owner_id,
        }
    }

    /// Trim the required fields and check they are non-empty.
    pub fn normalized(mut self) -> CoreResult<Self> {
        self.code = self.code.trim().to_string();
        self.title = self.title.trim().to_string();
        self.validate()?;
        Ok(self)
    }

    /// `true` when `principal` may edit or delete this item.
    pub fn is_owned_by(&self, principal: &PrincipalId) -> bool {
        self.owner_id.as_ref() == Some(principal)
    }

    /// Overwrite the editable fields with a patch. `id`, `created_at` and
    /// `owner_id` are immutable.
    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        self.code = patch.code.clone();
        self.title = patch.title.clone();
        self.description = patch.description.clone();
        self.image_url = patch.image_url.clone();
        self.tags = patch.tags.clone();
    }
}

// ---------------------------------------------------------------------------
// ItemDraft / ItemPatch
// ---------------------------------------------------------------------------

/// A candidate item that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    #[serde(rename = "srefCode")]
    #[validate(length(min = 1, message = "must not be empty"))]
    pub code: String,

    #[validate(length(min = 1, message = "must not be empty"))]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub tags: TagSet,
}

impl ItemDraft {
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Trim every text field, drop blank optional fields and validate.
    pub fn normalized(mut self) -> CoreResult<Self> {
        self.code = self.code.trim().to_string();
        self.title = self.title.trim().to_string();
        self.description = non_blank(self.description);
        self.image_url = non_blank(self.image_url);
        self.validate()?;
        Ok(self)
    }
}

/// The editable subset of an item, sent to the backend on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(rename = "srefCode")]
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub tags: TagSet,
}

impl From<&Item> for ItemPatch {
    fn from(item: &Item) -> Self {
        Self {
            code: item.code.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            image_url: item.image_url.clone(),
            tags: item.tags.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
