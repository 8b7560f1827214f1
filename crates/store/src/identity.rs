//! Identity resolver: tracks the current principal and runs sign-in,
//! sign-up and sign-out against an [`IdentityProvider`].
//!
//! The session is held in a `watch` channel so consumers (the catalog
//! store, via [`crate::sync::IdentitySync`]) are told whenever the principal
//! changes. A sign-up rejected with a rate limit starts a local cooldown
//! during which further sign-ups fail immediately without contacting the
//! provider.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sref_core::error::{CoreError, CoreResult};
use sref_core::types::Principal;
use sref_events::{CatalogEvent, EventBus, EventKind};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use validator::Validate;

use crate::config::IdentityConfig;
use crate::gateway::{GatewayError, IdentityProvider, SignUpOutcome};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Anonymous,
    /// A sign-in or sign-up is awaiting the provider.
    Authenticating,
    Authenticated(Principal),
}

impl SessionState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated(principal) => Some(principal),
            _ => None,
        }
    }

    /// `false` only while a provider call is pending.
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionState::Authenticating)
    }

    fn from_principal(principal: Option<Principal>) -> Self {
        principal.map_or(SessionState::Anonymous, SessionState::Authenticated)
    }
}

#[derive(Debug, Validate)]
struct Credentials {
    #[validate(email(message = "must be a valid email address"))]
    email: String,

    #[validate(length(min = 1, message = "must not be empty"))]
    password: String,
}

impl Credentials {
    /// Trim the email and check both fields.
    fn checked(email: &str, password: &str) -> CoreResult<Self> {
        let credentials = Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        credentials.validate()?;
        Ok(credentials)
    }
}

pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    events: Arc<EventBus>,
    config: IdentityConfig,
    session: watch::Sender<SessionState>,
    /// End of the current sign-up cooldown, if one is running.
    cooldown_until: Mutex<Option<Instant>>,
}

impl IdentityResolver {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        events: Arc<EventBus>,
        config: IdentityConfig,
    ) -> Self {
        let (session, _) = watch::channel(SessionState::Anonymous);
        Self {
            provider,
            events,
            config,
            session,
            cooldown_until: Mutex::new(None),
        }
    }

    /// Pick up a session that outlived the previous run.
    pub async fn restore(&self) -> CoreResult<Option<Principal>> {
        let principal = self.provider.get_session().await?;
        tracing::debug!(principal = ?principal.as_ref().map(|p| &p.id), "Session restored");
        self.set_session(SessionState::from_principal(principal.clone()));
        Ok(principal)
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.session.borrow().principal().cloned()
    }

    pub fn session(&self) -> SessionState {
        self.session.borrow().clone()
    }

    /// Subscribe to session changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// Session changes the provider reports on its own (expiry, sign-in in
    /// another process), if it reports any.
    pub fn provider_session_changes(&self) -> Option<broadcast::Receiver<Option<Principal>>> {
        self.provider.session_changes()
    }

    /// Adopt a session change reported by the provider.
    pub fn session_changed(&self, principal: Option<Principal>) {
        tracing::info!(principal = ?principal.as_ref().map(|p| &p.id), "Provider reported session change");
        self.set_session(SessionState::from_principal(principal));
    }

    // ---- sign-in / sign-up / sign-out ------------------------------------

    pub async fn sign_in(&self, email: &str, password: &str) -> CoreResult<Principal> {
        let credentials = Credentials::checked(email, password)?;

        let previous = self.begin_authenticating();
        match self
            .provider
            .sign_in(&credentials.email, &credentials.password)
            .await
        {
            Ok(principal) => {
                tracing::info!(user_id = %principal.id, "Signed in");
                self.set_session(SessionState::Authenticated(principal.clone()));
                self.events.publish(
                    CatalogEvent::new(EventKind::SignedIn, "Signed in successfully")
                        .with_actor(Some(principal.id.clone())),
                );
                Ok(principal)
            }
            Err(err) => {
                self.set_session(previous);
                Err(self.fail("Sign in failed", err.into()))
            }
        }
    }

    /// Register a new account.
    ///
    /// Returns the new principal when the provider opened a session right
    /// away, or `None` when the account must be confirmed first.
    pub async fn sign_up(&self, email: &str, password: &str) -> CoreResult<Option<Principal>> {
        if let Some(remaining) = self.cooldown_remaining() {
            tracing::debug!(remaining_secs = remaining.as_secs(), "Sign-up blocked by cooldown");
            return Err(self.fail("Sign up failed", rate_limited(remaining)));
        }

        let credentials = Credentials::checked(email, password)?;

        let previous = self.begin_authenticating();
        match self
            .provider
            .sign_up(&credentials.email, &credentials.password)
            .await
        {
            Ok(SignUpOutcome::SignedIn(principal)) => {
                tracing::info!(user_id = %principal.id, "Signed up");
                self.set_session(SessionState::Authenticated(principal.clone()));
                self.events.publish(
                    CatalogEvent::new(EventKind::SignedUp, "Account created successfully")
                        .with_actor(Some(principal.id.clone())),
                );
                Ok(Some(principal))
            }
            Ok(SignUpOutcome::ConfirmationRequired) => {
                tracing::info!("Signed up, confirmation pending");
                self.set_session(previous);
                self.events.publish(CatalogEvent::new(
                    EventKind::SignedUp,
                    "Check your email to confirm your account",
                ));
                Ok(None)
            }
            Err(GatewayError::RateLimited { .. }) => {
                self.set_session(previous);
                let cooldown = self.config.signup_cooldown;
                *self.lock_cooldown() = Some(Instant::now() + cooldown);
                tracing::warn!(cooldown_secs = cooldown.as_secs(), "Sign-up rate limited, cooldown started");
                Err(self.fail("Sign up failed", rate_limited(cooldown)))
            }
            Err(err) => {
                self.set_session(previous);
                Err(self.fail("Sign up failed", err.into()))
            }
        }
    }

    /// End the session.
    ///
    /// The local session is cleared even when the provider call fails, so
    /// no owner-scoped data outlives a sign-out request.
    pub async fn sign_out(&self) -> CoreResult<()> {
        let actor = self.current_principal().map(|p| p.id);
        let result = self.provider.sign_out().await;
        self.set_session(SessionState::Anonymous);

        match result {
            Ok(()) => {
                tracing::info!(user_id = ?actor, "Signed out");
                self.events.publish(
                    CatalogEvent::new(EventKind::SignedOut, "Signed out").with_actor(actor),
                );
                Ok(())
            }
            Err(err) => Err(self.fail("Sign out failed", err.into())),
        }
    }

    /// Time left before sign-up may be attempted again. Clears the cooldown
    /// once it has run out.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let mut until = self.lock_cooldown();
        let remaining = until.map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match remaining {
            Some(left) if !left.is_zero() => Some(left),
            _ => {
                *until = None;
                None
            }
        }
    }

    // ---- helpers ---------------------------------------------------------

    fn begin_authenticating(&self) -> SessionState {
        self.session.send_replace(SessionState::Authenticating)
    }

    fn set_session(&self, next: SessionState) {
        self.session.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn lock_cooldown(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.cooldown_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, context: &str, err: CoreError) -> CoreError {
        tracing::warn!(error = %err, "{context}");
        self.events
            .publish(CatalogEvent::failure(format!("{context}: {err}")));
        err
    }
}

/// Rate-limit error carrying the wait rounded up to whole seconds.
fn rate_limited(remaining: Duration) -> CoreError {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    CoreError::RateLimited {
        retry_after_secs: secs,
    }
}
