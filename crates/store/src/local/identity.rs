//! In-process identity provider with Argon2id-hashed accounts.
//!
//! Pairs with [`LocalGateway`](super::LocalGateway) when no hosted auth
//! service is configured. Accounts are kept in memory and, when opened with
//! [`LocalIdentityProvider::open`], saved to a JSON file after every sign-up
//! so later runs can sign in again. Sessions are never persisted. Sign-up is
//! rate limited to a fixed number of attempts per sliding window.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sref_core::types::Principal;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::password::{check_password_length, hash_password, verify_password};
use crate::gateway::{GatewayError, IdentityProvider, SignUpOutcome};

/// Sign-up attempts allowed per window before the provider answers with a
/// rate limit.
pub const DEFAULT_SIGNUP_ATTEMPTS: usize = 3;
pub const DEFAULT_SIGNUP_WINDOW: Duration = Duration::from_secs(60);

const INVALID_LOGIN: &str = "Invalid login credentials";
const ALREADY_REGISTERED: &str = "User already registered";

/// Account file kept beside an item data file, e.g.
/// `sref-gallery-items.json` -> `sref-gallery-items.accounts.json`.
pub fn accounts_file_for(data_file: &Path) -> PathBuf {
    data_file.with_extension("accounts.json")
}

#[derive(Clone, Serialize, Deserialize)]
struct Account {
    principal: Principal,
    password_hash: String,
}

#[derive(Default)]
struct ProviderState {
    /// Keyed by lowercased email.
    accounts: HashMap<String, Account>,
    session: Option<Principal>,
    signup_attempts: VecDeque<Instant>,
}

pub struct LocalIdentityProvider {
    state: Mutex<ProviderState>,
    path: Option<PathBuf>,
    /// Serializes sign-ups so the account file is written in order.
    persist: tokio::sync::Mutex<()>,
    session_tx: broadcast::Sender<Option<Principal>>,
    max_signup_attempts: usize,
    signup_window: Duration,
}

impl LocalIdentityProvider {
    pub fn new() -> Self {
        Self::with_signup_limit(DEFAULT_SIGNUP_ATTEMPTS, DEFAULT_SIGNUP_WINDOW)
    }

    pub fn with_signup_limit(max_attempts: usize, window: Duration) -> Self {
        let (session_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(ProviderState::default()),
            path: None,
            persist: tokio::sync::Mutex::new(()),
            session_tx,
            max_signup_attempts: max_attempts,
            signup_window: window,
        }
    }

    /// Load accounts from `path`. A missing file means no accounts yet; a
    /// file that does not parse is an error and is left untouched.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let path = path.into();
        let accounts = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str::<Vec<Account>>(&contents).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse saved accounts");
                GatewayError::Unavailable(format!("{} is not a valid account file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(GatewayError::Unavailable(format!("{}: {e}", path.display())));
            }
        };

        tracing::info!(path = %path.display(), count = accounts.len(), "Opened local accounts");
        let provider = Self::new();
        provider.lock().accounts = accounts
            .into_iter()
            .map(|account| (account.principal.email.to_lowercase(), account))
            .collect();
        Ok(Self {
            path: Some(path),
            ..provider
        })
    }

    /// End the current session as if it had expired. Subscribers of
    /// [`IdentityProvider::session_changes`] are told.
    pub fn revoke_session(&self) {
        let had_session = self.lock().session.take().is_some();
        if had_session {
            tracing::info!("Local session revoked");
            let _ = self.session_tx.send(None);
        }
    }

    /// Count a sign-up attempt, or report how long until one is allowed.
    fn record_signup_attempt(&self, state: &mut ProviderState) -> Result<(), GatewayError> {
        let now = Instant::now();
        while state
            .signup_attempts
            .front()
            .is_some_and(|at| now.duration_since(*at) >= self.signup_window)
        {
            state.signup_attempts.pop_front();
        }

        if state.signup_attempts.len() >= self.max_signup_attempts {
            let retry_after = state
                .signup_attempts
                .front()
                .map(|oldest| self.signup_window.saturating_sub(now.duration_since(*oldest)));
            return Err(GatewayError::RateLimited { retry_after });
        }
        state.signup_attempts.push_back(now);
        Ok(())
    }

    /// Write every account plus `added` to the account file, if there is one.
    async fn save_with(&self, added: &Account) -> Result<(), GatewayError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = {
            let state = self.lock();
            let mut accounts: Vec<&Account> = state.accounts.values().collect();
            accounts.push(added);
            accounts.sort_by(|a, b| a.principal.email.cmp(&b.principal.email));
            serde_json::to_string_pretty(&accounts)
                .map_err(|e| GatewayError::Unavailable(format!("failed to serialize accounts: {e}")))?
        };

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| GatewayError::Unavailable(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| GatewayError::Unavailable(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn get_session(&self) -> Result<Option<Principal>, GatewayError> {
        Ok(self.lock().session.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, GatewayError> {
        let key = email.trim().to_lowercase();
        let (principal, hash) = {
            let state = self.lock();
            let account = state
                .accounts
                .get(&key)
                .ok_or_else(|| GatewayError::InvalidCredentials(INVALID_LOGIN.into()))?;
            (account.principal.clone(), account.password_hash.clone())
        };

        let matches = verify_password(password, &hash)
            .map_err(|e| GatewayError::Unavailable(format!("password verification failed: {e}")))?;
        if !matches {
            tracing::debug!(email = %key, "Local sign-in rejected");
            return Err(GatewayError::InvalidCredentials(INVALID_LOGIN.into()));
        }

        self.lock().session = Some(principal.clone());
        Ok(principal)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError> {
        let key = email.trim().to_lowercase();
        {
            let mut state = self.lock();
            self.record_signup_attempt(&mut state)?;
            if state.accounts.contains_key(&key) {
                return Err(GatewayError::InvalidCredentials(ALREADY_REGISTERED.into()));
            }
        }
        check_password_length(password).map_err(GatewayError::InvalidCredentials)?;

        let password_hash = hash_password(password)
            .map_err(|e| GatewayError::Unavailable(format!("password hashing failed: {e}")))?;
        let account = Account {
            principal: Principal::new(uuid::Uuid::new_v4().to_string(), key.clone()),
            password_hash,
        };

        let _persist = self.persist.lock().await;
        if self.lock().accounts.contains_key(&key) {
            return Err(GatewayError::InvalidCredentials(ALREADY_REGISTERED.into()));
        }
        self.save_with(&account).await?;

        let principal = account.principal.clone();
        let mut state = self.lock();
        state.accounts.insert(key, account);
        state.session = Some(principal.clone());
        tracing::info!(user_id = %principal.id, "Local account created");
        Ok(SignUpOutcome::SignedIn(principal))
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        self.lock().session = None;
        Ok(())
    }

    fn session_changes(&self) -> Option<broadcast::Receiver<Option<Principal>>> {
        Some(self.session_tx.subscribe())
    }
}
