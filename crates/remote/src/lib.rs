//! HTTP adapters to a hosted database and auth service.
//!
//! [`connect`] builds an item gateway and an identity provider that share
//! one HTTP client and one session.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod items;

use std::sync::Arc;

pub use auth::RestIdentityProvider;
pub use client::{RestClient, Session};
pub use config::RemoteConfig;
pub use error::RemoteError;
pub use items::RestItemGateway;

/// The two halves of a remote backend.
pub struct RemoteBackend {
    pub items: Arc<RestItemGateway>,
    pub identity: Arc<RestIdentityProvider>,
}

pub fn connect(config: RemoteConfig) -> Result<RemoteBackend, RemoteError> {
    tracing::info!(url = %config.url, table = %config.table, "Connecting remote backend");
    let client = RestClient::new(config)?;
    Ok(RemoteBackend {
        items: Arc::new(RestItemGateway::new(client.clone())),
        identity: Arc::new(RestIdentityProvider::new(client)),
    })
}
