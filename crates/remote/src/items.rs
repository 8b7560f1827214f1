//! Item gateway over a PostgREST-style table endpoint.
//!
//! Rows use snake_case columns (`sref_code`, `image_url`, `created_at`,
//! `user_id`). Ownership scoping is a `user_id=eq.<id>` filter on the same
//! request, so a row owned by someone else matches nothing and is reported
//! as [`GatewayError::NotFound`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sref_core::item::{Item, ItemDraft, ItemPatch, TagSet};
use sref_core::types::{ItemId, PrincipalId};
use sref_store::{GatewayError, ItemGateway};

use crate::client::RestClient;
use crate::error::RemoteError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A table row as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRow {
    pub id: String,
    pub sref_code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Nullable column; older rows may hold `null`.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: ItemId::new(row.id),
            code: row.sref_code,
            title: row.title,
            description: row.description.filter(|d| !d.is_empty()),
            image_url: row.image_url.filter(|u| !u.is_empty()),
            tags: row.tags.map(TagSet::from).unwrap_or_default(),
            created_at: row.created_at,
            owner_id: row.user_id.map(PrincipalId::new),
        }
    }
}

/// Columns written on insert. `id` and `created_at` are assigned by the
/// database.
#[derive(Debug, Serialize)]
struct NewRow<'a> {
    sref_code: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    image_url: Option<&'a str>,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

impl<'a> NewRow<'a> {
    fn new(draft: &'a ItemDraft, owner: Option<&'a PrincipalId>) -> Self {
        Self {
            sref_code: &draft.code,
            title: &draft.title,
            description: draft.description.as_deref(),
            image_url: draft.image_url.as_deref(),
            tags: draft.tags.as_slice(),
            user_id: owner.map(PrincipalId::as_str),
        }
    }
}

/// Columns written on update.
#[derive(Debug, Serialize)]
struct PatchRow<'a> {
    sref_code: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    image_url: Option<&'a str>,
    tags: &'a [String],
}

impl<'a> From<&'a ItemPatch> for PatchRow<'a> {
    fn from(patch: &'a ItemPatch) -> Self {
        Self {
            sref_code: &patch.code,
            title: &patch.title,
            description: patch.description.as_deref(),
            image_url: patch.image_url.as_deref(),
            tags: patch.tags.as_slice(),
        }
    }
}

/// Query filters selecting one row, optionally scoped to an owner.
fn row_filter(id: &ItemId, owner: Option<&PrincipalId>) -> Vec<(&'static str, String)> {
    let mut query = vec![("id", format!("eq.{id}"))];
    if let Some(owner) = owner {
        query.push(("user_id", format!("eq.{owner}")));
    }
    query
}

fn list_query(owner: Option<&PrincipalId>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("order", "created_at.desc".to_string()),
    ];
    if let Some(owner) = owner {
        query.push(("user_id", format!("eq.{owner}")));
    }
    query
}

// ---------------------------------------------------------------------------
// RestItemGateway
// ---------------------------------------------------------------------------

pub struct RestItemGateway {
    client: RestClient,
}

impl RestItemGateway {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Send a mutation that returns the affected rows; no rows means the
    /// filter matched nothing.
    async fn mutate(&self, request: reqwest::RequestBuilder) -> Result<Vec<ItemRow>, GatewayError> {
        let response = request
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(RemoteError::from)?;
        let rows: Vec<ItemRow> = RestClient::parse_response(response).await?;
        if rows.is_empty() {
            return Err(GatewayError::NotFound);
        }
        Ok(rows)
    }
}

#[async_trait]
impl ItemGateway for RestItemGateway {
    async fn list(&self, owner: Option<&PrincipalId>) -> Result<Vec<Item>, GatewayError> {
        let response = self
            .client
            .request(Method::GET, self.client.config().table_url())
            .query(&list_query(owner))
            .send()
            .await
            .map_err(RemoteError::from)?;
        let rows: Vec<ItemRow> = RestClient::parse_response(response).await?;
        tracing::debug!(count = rows.len(), "Fetched remote items");
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn insert(
        &self,
        draft: &ItemDraft,
        owner: Option<&PrincipalId>,
    ) -> Result<Item, GatewayError> {
        let request = self
            .client
            .request(Method::POST, self.client.config().table_url())
            .json(&[NewRow::new(draft, owner)]);
        let mut rows = self.mutate(request).await.map_err(|e| match e {
            // An insert that returns nothing was filtered by row-level security.
            GatewayError::NotFound => GatewayError::Unauthorized("insert was not permitted".into()),
            other => other,
        })?;
        Ok(Item::from(rows.swap_remove(0)))
    }

    async fn update(
        &self,
        id: &ItemId,
        patch: &ItemPatch,
        owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError> {
        let request = self
            .client
            .request(Method::PATCH, self.client.config().table_url())
            .query(&row_filter(id, owner))
            .json(&PatchRow::from(patch));
        self.mutate(request).await?;
        Ok(())
    }

    async fn delete(&self, id: &ItemId, owner: Option<&PrincipalId>) -> Result<(), GatewayError> {
        let request = self
            .client
            .request(Method::DELETE, self.client.config().table_url())
            .query(&row_filter(id, owner));
        self.mutate(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_maps_onto_item() {
        let row: ItemRow = serde_json::from_str(
            r#"{
                "id": "0b6e",
                "sref_code": "--sref 42",
                "title": "Blue Abstract",
                "description": "",
                "image_url": null,
                "tags": ["abc", "abc", "x"],
                "created_at": "2024-05-01T12:00:00+00:00",
                "user_id": "u1"
            }"#,
        )
        .unwrap();

        let item = Item::from(row);
        assert_eq!(item.code, "--sref 42");
        assert_eq!(item.description, None);
        assert_eq!(item.tags.as_slice(), ["abc", "x"]);
        assert_eq!(item.owner_id, Some(PrincipalId::new("u1")));
    }

    #[test]
    fn null_tags_become_empty() {
        let row: ItemRow = serde_json::from_str(
            r#"{"id": "1", "sref_code": "A", "title": "t", "tags": null, "created_at": "2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(Item::from(row).tags.is_empty());
    }

    #[test]
    fn new_row_uses_column_names() {
        let draft = ItemDraft::new("SR-1", "Blue").with_tags(["abc"]);
        let owner = PrincipalId::new("u1");
        let json = serde_json::to_value(NewRow::new(&draft, Some(&owner))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sref_code": "SR-1",
                "title": "Blue",
                "description": null,
                "image_url": null,
                "tags": ["abc"],
                "user_id": "u1"
            })
        );
    }

    #[test]
    fn filters_scope_by_owner() {
        let owner = PrincipalId::new("u1");
        assert_eq!(
            row_filter(&ItemId::new("9"), Some(&owner)),
            vec![("id", "eq.9".to_string()), ("user_id", "eq.u1".to_string())]
        );
        assert_eq!(list_query(None).len(), 2);
        assert!(list_query(Some(&owner)).contains(&("user_id", "eq.u1".to_string())));
    }
}
