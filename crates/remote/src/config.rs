use std::time::Duration;

use crate::error::RemoteError;

/// Default table holding catalog rows.
pub const DEFAULT_TABLE: &str = "sref_items";

/// Connection settings for the hosted database and auth service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Service base URL without a trailing slash, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public API key sent with every request.
    pub anon_key: String,
    /// Table holding catalog rows (default: `sref_items`).
    pub table: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            table: DEFAULT_TABLE.to_string(),
            request_timeout_secs: 30,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Default      |
    /// |-----------------------------|--------------|
    /// | `SUPABASE_URL`              | required     |
    /// | `SUPABASE_ANON_KEY`         | required     |
    /// | `SREF_TABLE`                | `sref_items` |
    /// | `SREF_REQUEST_TIMEOUT_SECS` | `30`         |
    pub fn from_env() -> Result<Self, RemoteError> {
        let url = required("SUPABASE_URL")?;
        let anon_key = required("SUPABASE_ANON_KEY")?;
        let mut config = Self::new(url, anon_key);

        if let Ok(table) = std::env::var("SREF_TABLE") {
            if !table.trim().is_empty() {
                config.table = table.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var("SREF_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = raw.trim().parse().map_err(|_| {
                RemoteError::Config(format!(
                    "SREF_REQUEST_TIMEOUT_SECS must be a whole number of seconds (got '{raw}')"
                ))
            })?;
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `{url}/rest/v1/{table}`
    pub fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    /// `{url}/auth/v1/{path}`
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path.trim_start_matches('/'))
    }
}

fn required(name: &str) -> Result<String, RemoteError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RemoteError::Config(format!("{name} must be set to use the remote backend")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_the_base() {
        let config = RemoteConfig::new("https://demo.supabase.co/", "anon");
        assert_eq!(config.table_url(), "https://demo.supabase.co/rest/v1/sref_items");
        assert_eq!(
            config.auth_url("token?grant_type=password"),
            "https://demo.supabase.co/auth/v1/token?grant_type=password"
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
