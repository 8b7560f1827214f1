//! Shared HTTP plumbing: one [`reqwest::Client`], the connection settings
//! and the session token every request authenticates with.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sref_core::types::Principal;

use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// An authenticated session issued by the auth service.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub principal: Principal,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cloneable handle to the client and current session.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<RemoteConfig>,
    session: Arc<RwLock<Option<Session>>>,
}

impl RestClient {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(http, config))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, config: RemoteConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the session, returning the previous one.
    pub fn set_session(&self, session: Option<Session>) -> Option<Session> {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, session)
    }

    /// Start a request carrying the API key and the bearer token (the
    /// session's access token, or the API key when signed out).
    pub fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let bearer = self
            .session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.config.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    // ---- response helpers ----

    /// Return the response unchanged on success, or a
    /// [`RemoteError::Api`] with the status and body text.
    pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(RemoteError::Api {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }

    pub async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn check_status(response: reqwest::Response) -> Result<(), RemoteError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
