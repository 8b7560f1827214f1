//! Identity provider over a GoTrue-style auth endpoint.
//!
//! Sessions are kept in the shared [`RestClient`], so the item gateway
//! authenticates with whichever principal signed in last. An expired session
//! is refreshed on the next [`get_session`](IdentityProvider::get_session);
//! if that fails the session is dropped and subscribers of
//! [`session_changes`](IdentityProvider::session_changes) are told.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Method;
use serde::Deserialize;
use sref_core::types::Principal;
use sref_store::{GatewayError, IdentityProvider, SignUpOutcome};
use tokio::sync::broadcast;

use crate::client::{RestClient, Session};
use crate::error::RemoteError;

/// Lifetime assumed when the service does not say.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserRecord,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(|| {
                now + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            principal: Principal::new(self.user.id, self.user.email.unwrap_or_default()),
        }
    }
}

/// Sign-up answers with a session when confirmation is disabled, or with
/// the bare user record when the address must be confirmed first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(UserRecord),
}

#[derive(serde::Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

pub struct RestIdentityProvider {
    client: RestClient,
    session_tx: broadcast::Sender<Option<Principal>>,
}

impl RestIdentityProvider {
    pub fn new(client: RestClient) -> Self {
        let (session_tx, _) = broadcast::channel(16);
        Self { client, session_tx }
    }

    async fn post_credentials(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .request(Method::POST, self.client.config().auth_url(path))
            .json(&PasswordCredentials { email, password })
            .send()
            .await
            .map_err(RemoteError::from)?;
        RestClient::ensure_success(response)
            .await
            .map_err(RemoteError::into_auth_error)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, RemoteError> {
        let response = self
            .client
            .request(
                Method::POST,
                self.client.config().auth_url("token?grant_type=refresh_token"),
            )
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = RestClient::parse_response(response).await?;
        Ok(token.into_session(Utc::now()))
    }

    fn expire(&self) {
        if self.client.set_session(None).is_some() {
            tracing::info!("Remote session expired");
            let _ = self.session_tx.send(None);
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn get_session(&self) -> Result<Option<Principal>, GatewayError> {
        let Some(session) = self.client.session() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session.principal));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.expire();
            return Ok(None);
        };
        match self.refresh(refresh_token).await {
            Ok(fresh) => {
                tracing::debug!(user_id = %fresh.principal.id, "Remote session refreshed");
                let principal = fresh.principal.clone();
                self.client.set_session(Some(fresh));
                Ok(Some(principal))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh remote session");
                self.expire();
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, GatewayError> {
        let response = self
            .post_credentials("token?grant_type=password", email, password)
            .await?;
        let token: TokenResponse = response.json().await.map_err(RemoteError::from)?;
        let session = token.into_session(Utc::now());
        let principal = session.principal.clone();
        self.client.set_session(Some(session));
        Ok(principal)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError> {
        let response = self.post_credentials("signup", email, password).await?;
        match response.json::<SignUpResponse>().await.map_err(RemoteError::from)? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                let principal = session.principal.clone();
                self.client.set_session(Some(session));
                Ok(SignUpOutcome::SignedIn(principal))
            }
            SignUpResponse::User(user) => {
                tracing::debug!(user_id = %user.id, "Sign-up awaiting confirmation");
                Ok(SignUpOutcome::ConfirmationRequired)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        if self.client.session().is_none() {
            return Ok(());
        }
        let result = self
            .client
            .request(Method::POST, self.client.config().auth_url("logout"))
            .send()
            .await
            .map_err(RemoteError::from);
        // The local session goes regardless of what the service says.
        self.client.set_session(None);

        let response = result?;
        match RestClient::check_status(response).await {
            Ok(()) => Ok(()),
            // Already invalid on the server side.
            Err(RemoteError::Api { status: 401 | 403, .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn session_changes(&self) -> Option<broadcast::Receiver<Option<Principal>>> {
        Some(self.session_tx.subscribe())
    }
}
