mod common;

use assert_matches::assert_matches;
use common::*;
use sref_core::error::CoreError;
use sref_core::item::ItemDraft;
use sref_core::state::ViewMode;
use sref_core::types::{ItemId, PrincipalId};
use sref_events::{EventKind, RemoteChange};
use sref_store::{CatalogMode, GatewayError};

fn id(s: &str) -> ItemId {
    ItemId::new(s)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_replaces_items_newest_first() {
    let h = harness(CatalogMode::Local, sample_items());
    let count = h.store.load(None).await.unwrap();

    assert_eq!(count, 2);
    let codes: Vec<_> = h.store.snapshot().items.iter().map(|i| i.code.clone()).collect();
    assert_eq!(codes, vec!["SR-1", "SR-2"]);

    // Repeating the load is an idempotent replace.
    h.store.load(None).await.unwrap();
    assert_eq!(h.store.snapshot().items.len(), 2);
}

#[tokio::test]
async fn failed_load_leaves_items_untouched_and_reports() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let mut events = h.store.events();

    h.gateway.fail_next(GatewayError::Unavailable("connection refused".into()));
    let err = h.store.load(None).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(h.store.snapshot().items.len(), 2);
    let event = events.try_recv().unwrap();
    assert!(event.is_failure());
    assert!(event.message.starts_with("Failed to load items"));
}

#[tokio::test]
async fn private_mode_without_principal_loads_nothing_remotely() {
    let h = harness(CatalogMode::Private, sample_items());
    assert_eq!(h.store.load(None).await.unwrap(), 0);

    assert!(h.store.snapshot().items.is_empty());
    assert_eq!(h.gateway.calls(Op::List), 0);
}

#[tokio::test]
async fn private_mode_loads_only_own_items() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;
    let items = h.store.snapshot().items.clone();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].code, "SR-1");
}

#[tokio::test]
async fn shared_mode_loads_everything() {
    let h = loaded(CatalogMode::Shared, sample_items(), Some(principal("u1"))).await;
    assert_eq!(h.store.snapshot().items.len(), 2);
}

#[tokio::test]
async fn load_that_finishes_after_sign_out_is_discarded() {
    let h = harness(CatalogMode::Private, sample_items());
    let gate = h.gateway.gate();
    let hold = gate.write().await;

    let store = h.store.clone();
    let pending = tokio::spawn(async move { store.load(Some(&principal("u1"))).await });
    while h.gateway.entered() == 0 {
        tokio::task::yield_now().await;
    }

    h.store.on_identity_changed(None).await.unwrap();
    drop(hold);

    assert_eq!(pending.await.unwrap().unwrap(), 1);
    assert!(h.store.snapshot().items.is_empty());
    assert_eq!(h.store.principal(), None);
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_prepends_the_confirmed_item() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let mut events = h.store.events();

    let created = h
        .store
        .create(ItemDraft::new("  SR-3 ", "Green Haze").with_tags(["z", "z"]))
        .await
        .unwrap();

    assert!(!created.id.is_empty());
    assert_eq!(created.code, "SR-3");
    assert_eq!(created.tags.as_slice(), ["z"]);
    assert_eq!(created.owner_id, None);

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(snapshot.items[0], created);

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::ItemCreated);
    assert_eq!(event.message, "Item added successfully");
    assert_eq!(event.item_id, Some(created.id));
}

#[tokio::test]
async fn create_with_blank_title_never_reaches_the_gateway() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let before = h.gateway.total_calls();

    let err = h.store.create(ItemDraft::new("SR-3", "   ")).await.unwrap_err();

    assert_matches!(err, CoreError::Validation { ref field, .. } if field == "title");
    assert_eq!(h.gateway.total_calls(), before);
    assert_eq!(h.store.snapshot().items.len(), 2);
}

#[tokio::test]
async fn create_requires_a_principal_when_ownership_is_enforced() {
    let h = loaded(CatalogMode::Shared, sample_items(), None).await;

    let err = h.store.create(ItemDraft::new("SR-3", "Green")).await.unwrap_err();

    assert_matches!(err, CoreError::Unauthorized(_));
    assert_eq!(h.gateway.calls(Op::Insert), 0);
}

#[tokio::test]
async fn create_stamps_the_current_principal_as_owner() {
    let h = loaded(CatalogMode::Shared, sample_items(), Some(principal("u1"))).await;

    let created = h.store.create(ItemDraft::new("SR-3", "Green")).await.unwrap();

    assert_eq!(created.owner_id.as_ref().map(|p| p.as_str()), Some("u1"));
}

#[tokio::test]
async fn failed_create_leaves_state_unchanged() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let before = h.store.snapshot();
    let mut events = h.store.events();

    h.gateway.fail_next(GatewayError::Rejected {
        status: 400,
        message: "bad row".into(),
    });
    let err = h.store.create(ItemDraft::new("SR-3", "Green")).await.unwrap_err();

    assert_matches!(err, CoreError::Remote(_));
    assert_eq!(*h.store.snapshot(), *before);
    assert!(events.try_recv().unwrap().is_failure());
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_replaces_the_entry_and_the_selection() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    h.store.set_selected_item(Some(&id("a")));

    let mut edited = h.store.get(&id("a")).unwrap();
    edited.title = "Blue Abstract II".into();
    edited.tags = ["abc", "new"].into_iter().collect();
    let updated = h.store.update(edited.clone()).await.unwrap();

    assert_eq!(updated, edited);
    let snapshot = h.store.snapshot();
    let matching: Vec<_> = snapshot.items.iter().filter(|i| i.id == id("a")).collect();
    assert_eq!(matching, vec![&edited]);
    assert_eq!(snapshot.selected_item.as_ref(), Some(&edited));
    assert_eq!(h.gateway.stored().await[0].title, "Blue Abstract II");
}

#[tokio::test]
async fn update_keeps_identity_fields_of_the_stored_item() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let original = h.store.get(&id("a")).unwrap();

    let mut edited = original.clone();
    edited.created_at = chrono::Utc::now();
    edited.code = "SR-1b".into();
    let updated = h.store.update(edited).await.unwrap();

    assert_eq!(updated.created_at, original.created_at);
    assert_eq!(updated.code, "SR-1b");
}

#[tokio::test]
async fn update_with_empty_code_is_rejected_locally() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;

    let mut edited = h.store.get(&id("a")).unwrap();
    edited.code = String::new();
    let err = h.store.update(edited).await.unwrap_err();

    assert_matches!(err, CoreError::Validation { ref message, .. } if message == "must not be empty");
    assert_eq!(h.gateway.calls(Op::Update), 0);
}

#[tokio::test]
async fn update_by_non_owner_is_forbidden_and_local() {
    let h = loaded(CatalogMode::Shared, sample_items(), Some(principal("u1"))).await;
    let before = h.store.snapshot();

    let mut edited = h.store.get(&id("b")).unwrap();
    edited.title = "Mine now".into();
    let err = h.store.update(edited).await.unwrap_err();

    assert_matches!(err, CoreError::Forbidden(_));
    assert!(err.is_authorization());
    assert_eq!(h.gateway.calls(Op::Update), 0);
    assert_eq!(h.store.snapshot().items, before.items);
}

#[tokio::test]
async fn update_of_row_removed_remotely_surfaces_not_found() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let before = h.store.snapshot();

    h.gateway.fail_next(GatewayError::NotFound);
    let err = h.store.update(h.store.get(&id("a")).unwrap()).await.unwrap_err();

    assert_matches!(err, CoreError::NotFound { entity: "item", ref id } if id == "a");
    assert_eq!(*h.store.snapshot(), *before);
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_the_item_and_clears_its_selection() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    h.store.set_selected_item(Some(&id("a")));
    let mut events = h.store.events();

    h.store.delete(&id("a")).await.unwrap();

    let snapshot = h.store.snapshot();
    assert!(!snapshot.contains(&id("a")));
    assert_eq!(snapshot.selected_item, None);
    assert_eq!(events.try_recv().unwrap().message, "Item deleted successfully");
}

#[tokio::test]
async fn delete_keeps_an_unrelated_selection() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    h.store.set_selected_item(Some(&id("b")));

    h.store.delete(&id("a")).await.unwrap();

    assert_eq!(h.store.snapshot().selected_item.as_ref().map(|i| i.id.clone()), Some(id("b")));
}

#[tokio::test]
async fn delete_by_non_owner_is_forbidden_and_local() {
    let h = loaded(CatalogMode::Shared, sample_items(), Some(principal("u1"))).await;

    let err = h.store.delete(&id("b")).await.unwrap_err();

    assert_matches!(err, CoreError::Forbidden(_));
    assert_eq!(h.gateway.calls(Op::Delete), 0);
    assert!(h.store.snapshot().contains(&id("b")));
}

#[tokio::test]
async fn delete_when_signed_out_is_unauthorized() {
    let h = loaded(CatalogMode::Shared, sample_items(), None).await;

    let err = h.store.delete(&id("a")).await.unwrap_err();

    assert_matches!(err, CoreError::Unauthorized(_));
    assert_eq!(h.gateway.calls(Op::Delete), 0);
}

#[tokio::test]
async fn delete_of_absent_item_is_not_found_without_a_remote_call() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;

    let err = h.store.delete(&id("missing")).await.unwrap_err();

    assert_matches!(err, CoreError::NotFound { .. });
    assert_eq!(h.gateway.calls(Op::Delete), 0);
}

#[tokio::test]
async fn concurrent_delete_of_the_same_item_is_a_local_conflict() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let gate = h.gateway.gate();
    let hold = gate.write().await;
    let entered = h.gateway.entered();

    let store = h.store.clone();
    let first = tokio::spawn(async move { store.delete(&ItemId::new("a")).await });
    while h.gateway.entered() == entered {
        tokio::task::yield_now().await;
    }

    let second = h.store.delete(&id("a")).await;
    assert_matches!(second, Err(CoreError::Conflict(_)));

    drop(hold);
    first.await.unwrap().unwrap();
    assert_eq!(h.gateway.calls(Op::Delete), 1);

    // Once the first delete is applied, the item is simply gone.
    assert_matches!(h.store.delete(&id("a")).await, Err(CoreError::NotFound { .. }));
    assert_eq!(h.gateway.calls(Op::Delete), 1);
}

#[tokio::test]
async fn update_racing_a_delete_does_not_resurrect_the_item() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let gate = h.gateway.gate();
    let hold = gate.write().await;
    let entered = h.gateway.entered();

    let store = h.store.clone();
    let delete = tokio::spawn(async move { store.delete(&ItemId::new("a")).await });
    while h.gateway.entered() == entered {
        tokio::task::yield_now().await;
    }

    let mut edited = h.store.get(&id("a")).unwrap();
    edited.title = "late edit".into();
    assert_matches!(h.store.update(edited).await, Err(CoreError::Conflict(_)));

    drop(hold);
    delete.await.unwrap().unwrap();
    assert!(!h.store.snapshot().contains(&id("a")));
}

// ---------------------------------------------------------------------------
// Local transitions and derived queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filters_compose_search_and_tags() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;

    let all: Vec<_> = h.store.filtered_items().into_iter().map(|i| i.code).collect();
    assert_eq!(all, vec!["SR-1", "SR-2"]);

    h.store.set_search_query("ABC");
    let found: Vec<_> = h.store.filtered_items().into_iter().map(|i| i.code).collect();
    assert_eq!(found, vec!["SR-1"]);

    h.store.set_search_query("");
    h.store.toggle_tag("y");
    let tagged: Vec<_> = h.store.filtered_items().into_iter().map(|i| i.code).collect();
    assert_eq!(tagged, vec!["SR-2"]);

    h.store.set_search_query("blue");
    assert!(h.store.filtered_items().is_empty());

    h.store.clear_tags();
    assert_eq!(h.store.filtered_items().len(), 1);
}

#[tokio::test]
async fn toggling_a_tag_twice_restores_the_selection() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    h.store.toggle_tag("abc");
    let before = h.store.snapshot().selected_tags.clone();

    h.store.toggle_tag("x");
    h.store.toggle_tag("x");

    assert_eq!(h.store.snapshot().selected_tags, before);
}

#[tokio::test]
async fn tag_vocabulary_is_sorted_and_unique() {
    let mut items = sample_items();
    items[0].tags = ["b", "a"].into_iter().collect();
    items[1].tags = ["a", "c"].into_iter().collect();
    let h = loaded(CatalogMode::Local, items, None).await;

    assert_eq!(h.store.all_tags(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn view_state_transitions_make_no_remote_calls() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let before = h.gateway.total_calls();

    h.store.set_view_mode(ViewMode::List);
    h.store.toggle_add_modal();
    h.store.set_selected_item(Some(&id("missing")));

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.view_mode, ViewMode::List);
    assert!(snapshot.is_add_modal_open);
    assert_eq!(snapshot.selected_item, None);
    assert_eq!(h.gateway.total_calls(), before);
}

#[tokio::test]
async fn watchers_see_each_new_snapshot() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let mut rx = h.store.watch();
    let old = rx.borrow_and_update().clone();

    h.store.set_search_query("red");

    assert!(rx.has_changed().unwrap());
    let new = rx.borrow_and_update().clone();
    assert_eq!(new.search_query, "red");
    // Earlier snapshots are never mutated.
    assert_eq!(old.search_query, "");
}

// ---------------------------------------------------------------------------
// Identity changes and push changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signing_out_clears_a_private_catalog() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;
    h.store.set_selected_item(Some(&id("a")));
    let mut events = h.store.events();

    h.store.on_identity_changed(None).await.unwrap();

    let snapshot = h.store.snapshot();
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.selected_item, None);
    assert_eq!(events.try_recv().unwrap().kind, EventKind::CatalogCleared);
}

#[tokio::test]
async fn switching_principal_reloads_their_items() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;

    h.store.on_identity_changed(Some(principal("u2"))).await.unwrap();

    let codes: Vec<_> = h.store.snapshot().items.iter().map(|i| i.code.clone()).collect();
    assert_eq!(codes, vec!["SR-2"]);
}

#[tokio::test]
async fn local_mode_ignores_identity_changes() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let before = h.gateway.total_calls();

    h.store.on_identity_changed(Some(principal("u1"))).await.unwrap();

    assert_eq!(h.gateway.total_calls(), before);
    assert_eq!(h.store.snapshot().items.len(), 2);
}

#[tokio::test]
async fn remote_insert_of_a_known_id_acts_as_update() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;

    let mut changed = h.store.get(&id("b")).unwrap();
    changed.title = "Red Swirl (remote)".into();
    h.store.apply_remote_change(RemoteChange::Inserted(changed.clone()));

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(snapshot.item(&id("b")), Some(&changed));

    h.store.apply_remote_change(RemoteChange::Deleted(id("b")));
    assert!(!h.store.snapshot().contains(&id("b")));
}

#[tokio::test]
async fn remote_changes_of_other_owners_are_ignored_in_private_mode() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;

    h.store
        .apply_remote_change(RemoteChange::Inserted(item("c", "SR-9", "Theirs", Some("u2"), 5)));
    assert!(!h.store.snapshot().contains(&id("c")));

    h.store
        .apply_remote_change(RemoteChange::Inserted(item("d", "SR-8", "Mine", Some("u1"), 5)));
    assert_eq!(h.store.snapshot().items[0].id, id("d"));
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_then_import_reproduces_the_catalog() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let original = h.store.snapshot().items.clone();
    let dir = tempfile::tempdir().unwrap();

    let path = h.store.export_to_dir(dir.path()).await.unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("sref-codes-") && name.ends_with(".json"));

    let other = harness(CatalogMode::Local, Vec::new());
    let count = other.store.import_file(&path).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(other.store.snapshot().items, original);
    assert_eq!(other.gateway.stored().await, original);
}

#[tokio::test]
async fn exporting_an_empty_catalog_fails() {
    let h = loaded(CatalogMode::Local, Vec::new(), None).await;
    let dir = tempfile::tempdir().unwrap();
    let mut events = h.store.events();

    let err = h.store.export_to_dir(dir.path()).await.unwrap_err();

    assert_matches!(err, CoreError::Validation { .. });
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(events.try_recv().unwrap().message.contains("no data to export"));
}

#[tokio::test]
async fn invalid_import_changes_nothing() {
    let h = loaded(CatalogMode::Local, sample_items(), None).await;
    let before = h.store.snapshot();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(
        &path,
        r#"[{"id": "n1", "srefCode": "X", "title": "ok", "tags": [], "createdAt": "2024-05-01T12:00:00Z"},
            {"id": "n2", "srefCode": "", "title": "no code", "tags": [], "createdAt": "2024-05-01T12:00:00Z"}]"#,
    )
    .unwrap();

    let err = h.store.import_file(&path).await.unwrap_err();

    assert_matches!(err, CoreError::Validation { ref message, .. } if message.contains("entry 1"));
    assert_eq!(*h.store.snapshot(), *before);
    assert_eq!(h.gateway.calls(Op::ReplaceAll), 0);
}

#[tokio::test]
async fn import_requires_a_principal_when_ownership_is_enforced() {
    let h = loaded(CatalogMode::Shared, sample_items(), None).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.json");
    std::fs::write(&path, "[]").unwrap();

    assert_matches!(
        h.store.import_file(&path).await,
        Err(CoreError::Unauthorized(_))
    );
}

fn import_file_with(dir: &tempfile::TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("items.json");
    std::fs::write(&path, json).unwrap();
    path
}

#[tokio::test]
async fn private_import_replaces_only_the_callers_items() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;
    let dir = tempfile::tempdir().unwrap();
    let path = import_file_with(
        &dir,
        r#"[{"id": "z", "srefCode": "SR-9", "title": "Imported", "tags": []}]"#,
    );

    assert_eq!(h.store.import_file(&path).await.unwrap(), 1);

    let stored: Vec<_> = h
        .gateway
        .stored()
        .await
        .into_iter()
        .map(|i| (i.id, i.owner_id))
        .collect();
    assert!(stored.contains(&(id("b"), Some(PrincipalId::new("u2")))));
    assert!(stored.contains(&(id("z"), Some(PrincipalId::new("u1")))));
    assert!(!stored.iter().any(|(item, _)| *item == id("a")));

    let local: Vec<_> = h.store.snapshot().items.iter().map(|i| i.id.clone()).collect();
    assert_eq!(local, vec![id("z")]);
}

#[tokio::test]
async fn import_of_another_users_entry_is_forbidden() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;
    let before = h.store.snapshot();
    let dir = tempfile::tempdir().unwrap();
    let path = import_file_with(
        &dir,
        r#"[{"id": "z", "srefCode": "SR-9", "title": "Theirs", "tags": [], "userId": "u3"}]"#,
    );

    assert_matches!(h.store.import_file(&path).await, Err(CoreError::Forbidden(_)));
    assert_eq!(h.gateway.calls(Op::ReplaceAll), 0);
    assert_eq!(h.gateway.stored().await, sample_items());
    assert_eq!(*h.store.snapshot(), *before);
}

#[tokio::test]
async fn shared_import_keeps_other_owners_items_visible() {
    let h = loaded(CatalogMode::Shared, sample_items(), Some(principal("u1"))).await;
    let dir = tempfile::tempdir().unwrap();
    let path = import_file_with(
        &dir,
        r#"[{"id": "z", "srefCode": "SR-9", "title": "Imported", "tags": [],
             "createdAt": "2024-05-01T12:30:00Z", "userId": "u1"}]"#,
    );

    h.store.import_file(&path).await.unwrap();

    let local: Vec<_> = h.store.snapshot().items.iter().map(|i| i.id.clone()).collect();
    assert_eq!(local, vec![id("z"), id("b")]);
}

#[tokio::test]
async fn import_that_finishes_after_sign_out_is_not_applied() {
    let h = loaded(CatalogMode::Private, sample_items(), Some(principal("u1"))).await;
    let dir = tempfile::tempdir().unwrap();
    let path = import_file_with(
        &dir,
        r#"[{"id": "z", "srefCode": "SR-9", "title": "Imported", "tags": []}]"#,
    );
    let gate = h.gateway.gate();
    let hold = gate.write().await;
    let entered = h.gateway.entered();

    let store = h.store.clone();
    let pending = tokio::spawn(async move { store.import_file(&path).await });
    while h.gateway.entered() == entered {
        tokio::task::yield_now().await;
    }

    h.store.on_identity_changed(None).await.unwrap();
    drop(hold);

    assert_eq!(pending.await.unwrap().unwrap(), 1);
    assert!(h.store.snapshot().items.is_empty());
}
