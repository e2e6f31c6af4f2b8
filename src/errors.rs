use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced by the admin API.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Failure of a call that crosses a trust boundary (understanding backend,
/// reservation storage). Both variants are transient: the turn goes
/// unanswered and the session keeps its state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("{backend} timed out after {timeout_ms}ms")]
    Timeout {
        backend: &'static str,
        timeout_ms: u64,
    },

    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
}

impl BackendError {
    pub fn unavailable(backend: &'static str, reason: impl ToString) -> Self {
        BackendError::Unavailable {
            backend,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("reservation not found: {0}")]
    NotFound(String),

    #[error("reservation {0} was modified concurrently")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors worth another attempt with backoff.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for BackendError {
    fn is_transient(&self) -> bool {
        true
    }
}

impl Retryable for RepositoryError {
    fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Backend(_))
    }
}
