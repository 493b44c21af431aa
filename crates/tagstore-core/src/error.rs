//! Error types for tag lifecycle operations.

use thiserror::Error;

use crate::field::TagField;

/// Errors that can occur while loading, mutating or saving a tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("Unknown tag field '{0}'")]
    UnknownField(String),

    #[error("Invalid '{field}' value '{value}'")]
    InvalidValue { field: TagField, value: String },

    #[error("Cannot set {0} after tag is already loaded")]
    ImmutableFieldMutation(TagField),

    #[error("Tag id or key not set")]
    MissingIdentity,

    #[error("Library id must be set before saving")]
    NotSavable,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Tag id not available after insert")]
    IdentifierUnavailable,
}

impl TagError {
    pub(crate) fn invalid(field: TagField, value: impl ToString) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
        }
    }

    /// Check if this error came from the storage collaborator.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::UnknownField(_) | Self::InvalidValue { .. })
    }
}

/// Result type for tag operations.
pub type TagResult<T> = Result<T, TagError>;
