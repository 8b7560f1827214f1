//! Capability interfaces the store consumes.
//!
//! - [`ItemGateway`] -- row CRUD for items, scoped by owner, with an optional
//!   push-change subscription.
//! - [`IdentityProvider`] -- session lookup, sign-in/up/out and session change
//!   notifications.
//!
//! Both report failures as [`GatewayError`]; the store maps them onto
//! [`CoreError`].

use std::time::Duration;

use async_trait::async_trait;
use sref_core::error::CoreError;
use sref_core::item::{Item, ItemDraft, ItemPatch};
use sref_core::types::{ItemId, Principal, PrincipalId};
use sref_events::RemoteChange;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failure reported by a persistence or identity backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// No row matched (absent, or not visible to this owner).
    #[error("No matching record")]
    NotFound,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The backend answered but refused the request.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend could not be reached or failed internally.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The backend does not implement an optional capability.
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl GatewayError {
    /// Map onto the catalog taxonomy, naming the item a `NotFound` is about.
    pub fn for_item(self, id: &ItemId) -> CoreError {
        match self {
            GatewayError::NotFound => CoreError::item_not_found(id),
            other => other.into(),
        }
    }
}

impl From<GatewayError> for CoreError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound => CoreError::NotFound {
                entity: "record",
                id: String::new(),
            },
            GatewayError::Unauthorized(msg) => CoreError::Unauthorized(msg),
            GatewayError::InvalidCredentials(msg) => CoreError::InvalidCredentials(msg),
            GatewayError::RateLimited { retry_after } => CoreError::RateLimited {
                retry_after_secs: retry_after.map(|d| d.as_secs()).unwrap_or_default(),
            },
            GatewayError::Rejected { status, message } => {
                CoreError::Remote(format!("request rejected ({status}): {message}"))
            }
            GatewayError::Unavailable(msg) => CoreError::Remote(msg),
            GatewayError::Unsupported(what) => {
                CoreError::Unsupported(format!("{what} is not supported by this backend"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ItemGateway
// ---------------------------------------------------------------------------

/// Row-level persistence for catalog items.
///
/// `owner` restricts the operation to rows owned by that principal; `None`
/// means no ownership scoping. A row that exists but is owned by someone else
/// must be reported exactly like an absent row ([`GatewayError::NotFound`]).
#[async_trait]
pub trait ItemGateway: Send + Sync {
    /// Every visible item, newest first.
    async fn list(&self, owner: Option<&PrincipalId>) -> Result<Vec<Item>, GatewayError>;

    /// Persist a new item. The backend assigns `id` and `created_at`.
    async fn insert(
        &self,
        draft: &ItemDraft,
        owner: Option<&PrincipalId>,
    ) -> Result<Item, GatewayError>;

    async fn update(
        &self,
        id: &ItemId,
        patch: &ItemPatch,
        owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError>;

    async fn delete(&self, id: &ItemId, owner: Option<&PrincipalId>) -> Result<(), GatewayError>;

    /// Replace the collection with `items` (catalog import).
    ///
    /// With an `owner`, only that owner's rows are replaced and rows of
    /// other owners are kept. Every item must then belong to `owner`, and an
    /// id already taken by another owner's row is rejected.
    async fn replace_all(
        &self,
        _items: &[Item],
        _owner: Option<&PrincipalId>,
    ) -> Result<(), GatewayError> {
        Err(GatewayError::Unsupported("bulk replace"))
    }

    /// Push notifications for rows changed by other sessions, if the backend
    /// offers them.
    fn subscribe_changes(&self) -> Option<broadcast::Receiver<RemoteChange>> {
        None
    }
}

// ---------------------------------------------------------------------------
// IdentityProvider
// ---------------------------------------------------------------------------

/// Result of a successful sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account is active and a session was opened.
    SignedIn(Principal),
    /// The account exists but must be confirmed (e.g. by email) before the
    /// first sign-in.
    ConfirmationRequired,
}

/// Authentication backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The principal of the current session, if any.
    async fn get_session(&self) -> Result<Option<Principal>, GatewayError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, GatewayError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError>;

    async fn sign_out(&self) -> Result<(), GatewayError>;

    /// Session changes that happen outside this process's calls (expiry,
    /// sign-in elsewhere), if the backend reports them.
    fn session_changes(&self) -> Option<broadcast::Receiver<Option<Principal>>> {
        None
    }
}
