use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use sref_core::error::CoreError;

/// Default sign-up cooldown after the backend reports a rate limit.
pub const DEFAULT_SIGNUP_COOLDOWN: Duration = Duration::from_secs(60);

/// How the catalog relates to authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogMode {
    /// No authentication. Items carry no owner and anyone may edit them.
    #[default]
    Local,
    /// Everyone browses every item; only the owner may edit or delete.
    Shared,
    /// Each principal sees only their own items. Signing out clears them.
    Private,
}

impl CatalogMode {
    /// Whether mutations require an owning principal.
    pub fn enforces_ownership(self) -> bool {
        !matches!(self, CatalogMode::Local)
    }
}

impl fmt::Display for CatalogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogMode::Local => f.write_str("local"),
            CatalogMode::Shared => f.write_str("shared"),
            CatalogMode::Private => f.write_str("private"),
        }
    }
}

impl FromStr for CatalogMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(CatalogMode::Local),
            "shared" => Ok(CatalogMode::Shared),
            "private" => Ok(CatalogMode::Private),
            other => Err(CoreError::validation(
                "mode",
                format!("must be one of local, shared, private (got '{other}')"),
            )),
        }
    }
}

/// Catalog store behaviour.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub mode: CatalogMode,
}

impl StoreConfig {
    pub fn new(mode: CatalogMode) -> Self {
        Self { mode }
    }
}

/// Identity resolver behaviour.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// How long repeat sign-up attempts are blocked locally after a rate
    /// limit response.
    pub signup_cooldown: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            signup_cooldown: DEFAULT_SIGNUP_COOLDOWN,
        }
    }
}
