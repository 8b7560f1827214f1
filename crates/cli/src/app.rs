//! Wiring: backend, event bus, identity resolver and catalog store.

use std::sync::Arc;

use anyhow::Context;
use sref_core::types::Principal;
use sref_events::EventBus;
use sref_remote::RemoteConfig;
use sref_store::{
    CatalogStore, IdentityConfig, IdentityProvider, IdentityResolver, ItemGateway, LocalGateway,
    LocalIdentityProvider, StoreConfig,
};
use sref_store::local::accounts_file_for;

use crate::config::{AppConfig, Backend};

pub struct App {
    pub store: Arc<CatalogStore>,
    pub identity: Arc<IdentityResolver>,
    pub events: Arc<EventBus>,
}

impl App {
    /// Connect the configured backend, resolve the session and load the
    /// catalog for it. With `sign_in` false the configured credentials are
    /// not used and only an existing session is restored.
    pub async fn start(config: &AppConfig, sign_in: bool) -> anyhow::Result<Self> {
        let (gateway, provider): (Arc<dyn ItemGateway>, Arc<dyn IdentityProvider>) =
            match config.backend {
                Backend::Local => {
                    let gateway = LocalGateway::open(&config.data_file)
                        .await
                        .with_context(|| format!("failed to open {}", config.data_file.display()))?;
                    let gateway: Arc<dyn ItemGateway> = Arc::new(gateway);
                    let accounts = accounts_file_for(&config.data_file);
                    let provider = LocalIdentityProvider::open(&accounts)
                        .await
                        .with_context(|| format!("failed to open {}", accounts.display()))?;
                    let provider: Arc<dyn IdentityProvider> = Arc::new(provider);
                    (gateway, provider)
                }
                Backend::Remote => {
                    let backend = sref_remote::connect(RemoteConfig::from_env()?)?;
                    let gateway: Arc<dyn ItemGateway> = backend.items;
                    let provider: Arc<dyn IdentityProvider> = backend.identity;
                    (gateway, provider)
                }
            };
        tracing::info!(backend = ?config.backend, mode = %config.mode, "Backend ready");

        let events = Arc::new(EventBus::default());
        let identity = Arc::new(IdentityResolver::new(
            provider,
            events.clone(),
            IdentityConfig {
                signup_cooldown: config.signup_cooldown,
            },
        ));
        let store = Arc::new(CatalogStore::new(
            gateway,
            events.clone(),
            StoreConfig::new(config.mode),
        ));

        let app = Self {
            store,
            identity,
            events,
        };
        let principal = app.resolve_principal(config, sign_in).await?;
        app.store.load(principal.as_ref()).await?;
        Ok(app)
    }

    /// The restored session, or a fresh sign-in with the configured
    /// credentials when the mode needs a principal.
    async fn resolve_principal(
        &self,
        config: &AppConfig,
        sign_in: bool,
    ) -> anyhow::Result<Option<Principal>> {
        if !config.mode.enforces_ownership() {
            return Ok(None);
        }
        if let Some(principal) = self.identity.restore().await? {
            return Ok(Some(principal));
        }
        match (&config.email, &config.password) {
            (Some(email), Some(password)) if sign_in => {
                let principal = self
                    .identity
                    .sign_in(email, password)
                    .await
                    .context("sign-in with SREF_EMAIL/SREF_PASSWORD failed")?;
                Ok(Some(principal))
            }
            _ => {
                tracing::debug!("No credentials configured, browsing anonymously");
                Ok(None)
            }
        }
    }
}
