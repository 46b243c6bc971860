//! Error types for the backend layer.

use folio_format::FormatError;
use folio_model::{ModelError, WorkflowStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur in backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Credentials missing, expired or rejected by the host.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Entry, file, branch or change request does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote state differs from what the caller last observed.
    #[error(
        "conflict on `{path}`: expected {}, found {}",
        describe(.expected),
        describe(.actual)
    )]
    Conflict {
        path: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// Some, but not all, files of a save were written.
    #[error(
        "partial write ({} applied, {} failed, rolled back: {rolled_back}): {reason}",
        .applied.len(),
        .failed.len()
    )]
    PartialWrite {
        applied: Vec<String>,
        failed: Vec<String>,
        rolled_back: bool,
        reason: String,
    },

    /// Workflow status change that is not the immediate successor.
    #[error("invalid workflow transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    /// Host asked us to slow down.
    #[error("rate limited{}", .retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transport failure or host-side error. A write may or may not have
    /// been applied.
    #[error("network error: {0}")]
    Network(String),

    /// Host refused the request or could not be reached; nothing was applied.
    #[error("host unavailable: {0}")]
    Unavailable(String),

    /// Local file system failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Entry data or configuration rejected before reaching the host.
    #[error("validation error: {0}")]
    Validation(String),

    /// The save was cancelled before any write started.
    #[error("operation cancelled")]
    Cancelled,

    /// The backend cannot perform this operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn describe(hash: &Option<String>) -> String {
    match hash {
        Some(hash) => format!("`{hash}`"),
        None => "no file".to_string(),
    }
}

impl BackendError {
    /// Only transient failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Unavailable(_) | Self::RateLimited { .. }
        )
    }

    /// The host turned the request away before acting on it, so resending a
    /// non-idempotent write is safe.
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::PartialWrite { .. } => "partial_write",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::RateLimited { .. } => "rate_limited",
            Self::Network(_) => "network",
            Self::Unavailable(_) => "unavailable",
            Self::Storage(_) => "storage",
            Self::Validation(_) => "validation",
            Self::Cancelled => "cancelled",
            Self::Unsupported(_) => "unsupported",
            Self::Serialization(_) => "serialization",
        }
    }

    /// HTTP status used when this error crosses the proxy transport.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::Conflict { .. } => 409,
            Self::InvalidTransition { .. } => 422,
            Self::RateLimited { .. } => 429,
            Self::Validation(_) | Self::Serialization(_) => 400,
            Self::Cancelled => 499,
            Self::Unsupported(_) => 501,
            Self::Network(_) => 502,
            Self::Unavailable(_) => 503,
            Self::PartialWrite { .. } | Self::Storage(_) => 500,
        }
    }
}

impl From<FormatError> for BackendError {
    fn from(err: FormatError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<ModelError> for BackendError {
    fn from(err: ModelError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Wire form of a [`BackendError`]: `{"error": {"kind": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<WorkflowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<WorkflowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&BackendError> for ErrorPayload {
    fn from(err: &BackendError) -> Self {
        let mut payload = ErrorPayload {
            kind: err.kind().to_string(),
            message: err.to_string(),
            ..Default::default()
        };
        match err {
            BackendError::Auth(detail)
            | BackendError::NotFound(detail)
            | BackendError::Network(detail)
            | BackendError::Unavailable(detail)
            | BackendError::Storage(detail)
            | BackendError::Validation(detail)
            | BackendError::Unsupported(detail) => payload.message = detail.clone(),
            BackendError::Conflict {
                path,
                expected,
                actual,
            } => {
                payload.path = Some(path.clone());
                payload.expected = expected.clone();
                payload.actual = actual.clone();
            }
            BackendError::PartialWrite {
                applied,
                failed,
                rolled_back,
                reason,
            } => {
                payload.message = reason.clone();
                payload.applied = applied.clone();
                payload.failed = failed.clone();
                payload.rolled_back = Some(*rolled_back);
            }
            BackendError::InvalidTransition { from, to } => {
                payload.from = Some(*from);
                payload.to = Some(*to);
            }
            BackendError::RateLimited { retry_after_secs } => {
                payload.retry_after_secs = *retry_after_secs;
            }
            BackendError::Cancelled | BackendError::Serialization(_) => {}
        }
        payload
    }
}

impl From<&BackendError> for ErrorResponse {
    fn from(err: &BackendError) -> Self {
        Self { error: err.into() }
    }
}

impl From<ErrorPayload> for BackendError {
    fn from(payload: ErrorPayload) -> Self {
        match payload.kind.as_str() {
            "auth" => Self::Auth(payload.message),
            "not_found" => Self::NotFound(payload.message),
            "conflict" => Self::Conflict {
                path: payload.path.unwrap_or_default(),
                expected: payload.expected,
                actual: payload.actual,
            },
            "partial_write" => Self::PartialWrite {
                applied: payload.applied,
                failed: payload.failed,
                rolled_back: payload.rolled_back.unwrap_or(false),
                reason: payload.message,
            },
            "invalid_transition" => match (payload.from, payload.to) {
                (Some(from), Some(to)) => Self::InvalidTransition { from, to },
                _ => Self::Validation(payload.message),
            },
            "rate_limited" => Self::RateLimited {
                retry_after_secs: payload.retry_after_secs,
            },
            "unavailable" => Self::Unavailable(payload.message),
            "storage" => Self::Storage(payload.message),
            "validation" => Self::Validation(payload.message),
            "cancelled" => Self::Cancelled,
            "unsupported" => Self::Unsupported(payload.message),
            "serialization" => {
                Self::Serialization(<serde_json::Error as serde::de::Error>::custom(payload.message))
            }
            _ => Self::Network(payload.message),
        }
    }
}
