use std::time::Duration;

use sref_store::GatewayError;

/// Errors from the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Remote API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
        /// Parsed `Retry-After` header, when present.
        retry_after: Option<Duration>,
    },

    /// Missing or malformed connection settings.
    #[error("Remote configuration error: {0}")]
    Config(String),
}

impl RemoteError {
    /// Human-readable message from a JSON error body, falling back to the
    /// raw body.
    pub fn message(&self) -> String {
        match self {
            RemoteError::Api { body, .. } => error_message(body),
            other => other.to_string(),
        }
    }

    /// Mapping for auth endpoints, where 400 and 422 mean the credentials
    /// or the requested account were refused.
    pub fn into_auth_error(self) -> GatewayError {
        match self {
            RemoteError::Api { status: 400 | 422, ref body, .. } => {
                GatewayError::InvalidCredentials(error_message(body))
            }
            other => other.into(),
        }
    }
}

impl From<RemoteError> for GatewayError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Api {
                status,
                body,
                retry_after,
            } => match status {
                401 | 403 => GatewayError::Unauthorized(error_message(&body)),
                404 => GatewayError::NotFound,
                429 => GatewayError::RateLimited { retry_after },
                500..=599 => GatewayError::Unavailable(format!("{status}: {}", error_message(&body))),
                _ => GatewayError::Rejected {
                    status,
                    message: error_message(&body),
                },
            },
            RemoteError::Request(e) => GatewayError::Unavailable(e.to_string()),
            RemoteError::Config(msg) => GatewayError::Unavailable(msg),
        }
    }
}

/// Pull the message out of the error bodies the services produce
/// (`msg`, `error_description`, `message` or `error`).
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
