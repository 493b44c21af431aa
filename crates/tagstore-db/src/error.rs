//! Database error types.

use tagstore_core::TagError;
use thiserror::Error;

/// Database operation errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found.
    #[error("Entity not found")]
    NotFound,

    /// Duplicate key violation.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Foreign key violation.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A stored value failed domain validation.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Schema bootstrap error.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// SQLx error.
    #[error("Database error: {0}")]
    SqlxError(sqlx::Error),
}

impl DbError {
    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this is a duplicate key error.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return Self::DuplicateKey(db.message().to_string());
            }
            if db.is_foreign_key_violation() {
                return Self::ForeignKeyViolation(db.message().to_string());
            }
        }

        match e {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::SqlxError(other),
        }
    }
}

impl From<DbError> for TagError {
    fn from(e: DbError) -> Self {
        TagError::Storage(e.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
