use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use sref_store::config::DEFAULT_SIGNUP_COOLDOWN;
use sref_store::local::DEFAULT_DATA_FILE;
use sref_store::CatalogMode;

/// Where items and accounts live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// A JSON file on disk and an in-process account list.
    Local,
    /// The hosted database and auth service configured by `SUPABASE_*`.
    Remote,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub mode: CatalogMode,
    pub data_file: PathBuf,
    pub signup_cooldown: Duration,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                                  |
    /// |-----------------------------|------------------------------------------|
    /// | `SREF_BACKEND`              | `local`                                  |
    /// | `SREF_MODE`                 | `local` (local backend), `shared` (remote) |
    /// | `SREF_DATA_FILE`            | `sref-gallery-items.json`                |
    /// | `SREF_SIGNUP_COOLDOWN_SECS` | `60`                                     |
    /// | `SREF_EMAIL`                | unset                                    |
    /// | `SREF_PASSWORD`             | unset                                    |
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match var("SREF_BACKEND").as_deref() {
            None | Some("local") => Backend::Local,
            Some("remote") => Backend::Remote,
            Some(other) => anyhow::bail!("SREF_BACKEND must be 'local' or 'remote' (got '{other}')"),
        };

        let mode = match var("SREF_MODE") {
            Some(raw) => raw.parse().context("invalid SREF_MODE")?,
            None if backend == Backend::Remote => CatalogMode::Shared,
            None => CatalogMode::Local,
        };

        let data_file = var("SREF_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));

        let signup_cooldown = match var("SREF_SIGNUP_COOLDOWN_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("SREF_SIGNUP_COOLDOWN_SECS must be a number of seconds (got '{raw}')"))?,
            ),
            None => DEFAULT_SIGNUP_COOLDOWN,
        };

        Ok(Self {
            backend,
            mode,
            data_file,
            signup_cooldown,
            email: var("SREF_EMAIL"),
            password: var("SREF_PASSWORD"),
        })
    }
}

/// A set, non-blank environment variable.
fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
