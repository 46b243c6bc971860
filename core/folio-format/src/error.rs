//! Error types for entry serialization.

use folio_model::{FieldIssue, ModelError};
use thiserror::Error;

/// Result type for serialization operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors raised while turning entries into files and back.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Entry data does not match the collection's field tree.
    #[error("invalid entry data: {}", join_issues(.0))]
    Validation(Vec<FieldIssue>),

    /// Collection or i18n configuration is unusable.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A slug template could not be rendered.
    #[error("slug error: {0}")]
    Slug(String),

    /// A path does not belong to the collection's layout.
    #[error("path `{path}` does not match collection `{collection}`")]
    UnknownPath { collection: String, path: String },

    /// A file's bytes could not be parsed in its format.
    #[error("malformed file `{path}`: {reason}")]
    Malformed { path: String, reason: String },

    /// JSON encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
