#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sref_core::item::{Item, ItemDraft, ItemPatch};
use sref_core::types::{ItemId, Principal, PrincipalId};
use sref_events::{EventBus, RemoteChange};
use sref_store::{
    CatalogMode, CatalogStore, GatewayError, IdentityConfig, IdentityProvider, IdentityResolver,
    ItemGateway, LocalGateway, SignUpOutcome, StoreConfig,
};
use tokio::sync::{broadcast, RwLock};

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

pub fn principal(id: &str) -> Principal {
    Principal::new(id, format!("{id}@example.com"))
}

/// A confirmed item with a fixed timestamp, `minutes` after a base time.
pub fn item(id: &str, code: &str, title: &str, owner: Option<&str>, minutes: i64) -> Item {
    let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minutes);
    Item::from_draft(
        ItemId::new(id),
        created,
        ItemDraft::new(code, title),
        owner.map(PrincipalId::new),
    )
}

/// Items from the filter examples: SR-1 tagged `abc`, SR-2 tagged `y`.
pub fn sample_items() -> Vec<Item> {
    let mut blue = item("a", "SR-1", "Blue Abstract", Some("u1"), 1);
    blue.tags = ["abc", "x"].into_iter().collect();
    let mut red = item("b", "SR-2", "Red Swirl", Some("u2"), 0);
    red.tags = ["y"].into_iter().collect();
    vec![blue, red]
}

// ---------------------------------------------------------------------------
// RecordingGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Insert,
    Update,
    Delete,
    ReplaceAll,
}

/// Wraps a [`LocalGateway`], counting every call and optionally failing or
/// holding the next one.
pub struct RecordingGateway {
    inner: LocalGateway,
    calls: Mutex<HashMap<Op, usize>>,
    failures: Mutex<VecDeque<GatewayError>>,
    /// Calls wait for a read lock; tests hold the write lock to stall them.
    gate: Arc<RwLock<()>>,
    entered: AtomicUsize,
}

impl RecordingGateway {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            inner: LocalGateway::with_items(items),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            gate: Arc::new(RwLock::new(())),
            entered: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: GatewayError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn gate(&self) -> Arc<RwLock<()>> {
        self.gate.clone()
    }

    /// Calls that have started, including ones stalled at the gate.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub async fn stored(&self) -> Vec<Item> {
        self.inner.list(None).await.unwrap()
    }

    async fn enter(&self, op: Op) -> Result<(), GatewayError> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _pass = self.gate.read().await;
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ItemGateway for RecordingGateway {
    async fn list(&self, owner: Option<&PrincipalId>) -> Result<Vec<Item>, GatewayError> {
        self.enter(Op::List).await?;
        self.inner.list(owner).await
    }

    async fn insert(
        &self,
        draft: &ItemDraft,
        owner: Option<&PrincipalId>,
    ) -> Result<Item, GatewayError> {
        self.enter(Op::Insert).await?;
        self.inner.insert(draft, owner).await
    }

    async fn update(
        &self,
        id: &ItemId,
        patch: &ItemPatch,
        owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError> {
        self.enter(Op::Update).await?;
        self.inner.update(id, patch, owner).await
    }

    async fn delete(&self, id: &ItemId, owner: Option<&PrincipalId>) -> Result<(), GatewayError> {
        self.enter(Op::Delete).await?;
        self.inner.delete(id, owner).await
    }

    async fn replace_all(
        &self,
        items: &[Item],
        owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError> {
        self.enter(Op::ReplaceAll).await?;
        self.inner.replace_all(items, owner).await
    }

    fn subscribe_changes(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        self.inner.subscribe_changes()
    }
}

// ---------------------------------------------------------------------------
// ScriptedIdentity
// ---------------------------------------------------------------------------

/// Identity provider that answers from queued responses and counts calls.
#[derive(Default)]
pub struct ScriptedIdentity {
    pub session: Mutex<Option<Principal>>,
    sign_in: Mutex<VecDeque<Result<Principal, GatewayError>>>,
    sign_up: Mutex<VecDeque<Result<SignUpOutcome, GatewayError>>>,
    sign_out: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub sign_in_calls: AtomicUsize,
    pub sign_up_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl ScriptedIdentity {
    pub fn with_session(principal: Principal) -> Self {
        let identity = Self::default();
        *identity.session.lock().unwrap() = Some(principal);
        identity
    }

    pub fn on_sign_in(&self, result: Result<Principal, GatewayError>) {
        self.sign_in.lock().unwrap().push_back(result);
    }

    pub fn on_sign_up(&self, result: Result<SignUpOutcome, GatewayError>) {
        self.sign_up.lock().unwrap().push_back(result);
    }

    pub fn on_sign_out(&self, result: Result<(), GatewayError>) {
        self.sign_out.lock().unwrap().push_back(result);
    }

    pub fn sign_up_calls(&self) -> usize {
        self.sign_up_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn get_session(&self) -> Result<Option<Principal>, GatewayError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Principal, GatewayError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_in
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::InvalidCredentials("no scripted answer".into())))
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<SignUpOutcome, GatewayError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_up
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(SignUpOutcome::ConfirmationRequired))
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_out.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<CatalogStore>,
    pub gateway: Arc<RecordingGateway>,
    pub events: Arc<EventBus>,
}

pub fn harness(mode: CatalogMode, items: Vec<Item>) -> Harness {
    let gateway = Arc::new(RecordingGateway::new(items));
    let events = Arc::new(EventBus::default());
    let store = Arc::new(CatalogStore::new(
        gateway.clone(),
        events.clone(),
        StoreConfig::new(mode),
    ));
    Harness {
        store,
        gateway,
        events,
    }
}

/// A harness whose store has already loaded for `principal`.
pub async fn loaded(mode: CatalogMode, items: Vec<Item>, principal: Option<Principal>) -> Harness {
    let h = harness(mode, items);
    h.store.load(principal.as_ref()).await.unwrap();
    h
}

pub fn resolver(identity: Arc<ScriptedIdentity>, events: Arc<EventBus>) -> IdentityResolver {
    IdentityResolver::new(identity, events, IdentityConfig::default())
}
