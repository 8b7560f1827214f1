/// Failure taxonomy shared by every catalog operation.
///
/// Local pre-flight failures (`Validation`, `Unauthorized`, `Forbidden`,
/// `Conflict`) never reach a remote collaborator. Everything else reports
/// what the collaborator answered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {field} {message}")]
    Validation { field: String, message: String },

    /// No principal is signed in but the operation requires one.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The principal does not own the target item.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Too many attempts, try again in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Another operation for the same entity has not completed yet.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The remote service was unreachable or failed. Safe to retry.
    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<validator::ValidationErrors> for CoreError {
    /// Report the first offending field (alphabetically, so the result is
    /// deterministic).
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                CoreError::validation(field.to_string(), message)
            }
            None => CoreError::validation("input", "is invalid"),
        }
    }
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn item_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "item",
            id: id.to_string(),
        }
    }

    /// `true` for both flavours of authorization failure.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::Forbidden(_))
    }

    /// `true` when re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Conflict(_))
    }

    /// `true` when the backend failed, as opposed to a request refused
    /// locally or by policy.
    pub fn is_remote_failure(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}
