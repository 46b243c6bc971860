//! Core content model for Folio.
//!
//! Defines the types every other Folio crate depends on:
//! - [`Entry`]: one unit of structured content, possibly spread over several locale files
//! - [`Collection`]: declares where and how a content type's entries are stored
//! - [`Field`]: the recursive field tree (tagged by widget) with i18n and visibility rules
//! - [`WorkflowStatus`]: an unpublished entry's position in the editorial lifecycle
//! - [`PersistedFile`], [`MediaFile`], [`CommitRequest`]: what actually travels to a host
//!
//! These types are consumed (never loaded) by the serializer and the backends;
//! loading them from a site configuration file is the caller's job.

mod collection;
mod condition;
mod entry;
mod field;
mod file;
mod validation;
mod workflow;

pub mod bytes;

pub use collection::{
    Collection, CollectionFile, CollectionStorage, FileFormat, I18nConfig, I18nSetting,
    I18nStructure,
};
pub use condition::{Condition, ConditionOperator, Conditions, is_hidden, resolve_path};
pub use entry::{BaseHash, Entry};
pub use field::{Field, FieldI18n, FieldKind, NumberType};
pub use file::{CommitRequest, FileChange, MediaFile, PersistedFile};
pub use validation::{FieldIssue, validate_data};
pub use workflow::WorkflowStatus;

/// Result type alias using the crate's error type.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors raised while interpreting model configuration.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid collection `{collection}`: {reason}")]
    InvalidCollection { collection: String, reason: String },

    #[error("invalid i18n configuration: {0}")]
    InvalidI18n(String),

    #[error("unknown workflow status: {0}")]
    UnknownStatus(String),
}
