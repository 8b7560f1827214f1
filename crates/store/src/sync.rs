//! Background tasks that keep the catalog store in step with the outside
//! world.
//!
//! - [`ChangeSync`] folds push changes from the item gateway into the store.
//! - [`IdentitySync`] reloads or clears the store when the principal changes.
//! - [`ProviderSessionSync`] feeds provider-side session changes (expiry,
//!   sign-in elsewhere) into the identity resolver.
//!
//! Each runs until its [`CancellationToken`] fires or its source closes.

use std::sync::Arc;

use sref_core::types::Principal;
use sref_events::RemoteChange;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogStore;
use crate::identity::{IdentityResolver, SessionState};

// ---------------------------------------------------------------------------
// ChangeSync
// ---------------------------------------------------------------------------

pub struct ChangeSync;

impl ChangeSync {
    /// Apply every received change to `store`.
    ///
    /// When the receiver lags, the missed changes are unknown, so the store
    /// is reloaded from the gateway instead.
    pub async fn run(
        store: Arc<CatalogStore>,
        mut receiver: broadcast::Receiver<RemoteChange>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Change sync cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(change) => store.apply_remote_change(change),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Change sync lagged, reloading catalog");
                        let principal = store.principal();
                        // Failures are already published by the store.
                        let _ = store.load(principal.as_ref()).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Change feed closed, change sync shutting down");
                        break;
                    }
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IdentitySync
// ---------------------------------------------------------------------------

pub struct IdentitySync;

impl IdentitySync {
    /// Call [`CatalogStore::on_identity_changed`] each time the settled
    /// principal differs from the one the store was last loaded for.
    ///
    /// The pending `Authenticating` state is skipped so an in-progress
    /// sign-in does not clear a private catalog.
    pub async fn run(
        store: Arc<CatalogStore>,
        mut session: watch::Receiver<SessionState>,
        cancel: CancellationToken,
    ) {
        let mut last = store.principal();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Identity sync cancelled");
                    break;
                }
                changed = session.changed() => {
                    if changed.is_err() {
                        tracing::info!("Identity resolver dropped, identity sync shutting down");
                        break;
                    }
                    let state = session.borrow_and_update().clone();
                    if !state.is_settled() {
                        continue;
                    }
                    let principal = state.principal().cloned();
                    if principal == last {
                        continue;
                    }
                    tracing::debug!(
                        principal = ?principal.as_ref().map(|p| &p.id),
                        "Principal changed, refreshing catalog"
                    );
                    last = principal.clone();
                    let _ = store.on_identity_changed(principal).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderSessionSync
// ---------------------------------------------------------------------------

pub struct ProviderSessionSync;

impl ProviderSessionSync {
    pub async fn run(
        resolver: Arc<IdentityResolver>,
        mut receiver: broadcast::Receiver<Option<Principal>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(principal) => resolver.session_changed(principal),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Session feed lagged, re-reading session");
                        if let Err(e) = resolver.restore().await {
                            tracing::error!(error = %e, "Failed to re-read session");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Session feed closed, session sync shutting down");
                        break;
                    }
                },
            }
        }
    }
}
