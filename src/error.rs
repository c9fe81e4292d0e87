use teloxide::RequestError;
use thiserror::Error;

use crate::persistent::SessionError;

/// The kinds a handler failure is reported to the user as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    UpstreamUnavailable,
    ValidationFailed,
}

#[derive(Error, Debug)]
pub enum BotError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("upstream rejected request: {0}")]
    UpstreamRejected(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("telegram error: {0}")]
    Telegram(#[from] RequestError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::Validation(_) | Self::Json(_) => ErrorKind::ValidationFailed,
            Self::Upstream(_)
            | Self::UpstreamRejected(_)
            | Self::Telegram(_)
            | Self::Database(_)
            | Self::Session(_)
            | Self::Storage(_)
            | Self::Http(_) => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Only transient upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn user_message(&self) -> &'static str {
        use crate::bots::shop::res;
        match self.kind() {
            ErrorKind::NotFound => res::ERR_NOT_FOUND,
            ErrorKind::PermissionDenied => res::ERR_PERMISSION,
            ErrorKind::UpstreamUnavailable => res::ERR_UPSTREAM,
            ErrorKind::ValidationFailed => res::ERR_VALIDATION,
        }
    }
}
