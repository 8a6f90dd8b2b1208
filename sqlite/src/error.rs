//! Error types for database access and migrations.
//!
//! [`DatabaseError`] covers connection, configuration and statement failures;
//! [`MigrationError`] adds the migration runner's validation and halt
//! conditions on top of it.

use std::path::PathBuf;

use quarry_core::SqlError;
use thiserror::Error;

/// Errors that can occur while talking to the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLite operation failure.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// Statement construction or execution failure.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file parsing failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Missing or invalid configuration value.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// `begin_transaction` was called while a transaction is open.
    #[error("a transaction is already active")]
    TransactionActive,
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Errors raised by the migration runner.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// The migrations directory cannot be used.
    #[error("invalid migrations directory {}: {reason}", path.display())]
    Directory { path: PathBuf, reason: String },

    /// A migration class name is not PascalCase.
    #[error("invalid migration name '{0}': class names must be PascalCase")]
    InvalidName(String),

    /// A migration file with the same class name or version already exists.
    #[error("migration {0} already exists")]
    Duplicate(String),

    /// A file could not be turned into a runnable migration.
    #[error("invalid migration file {filename}: {reason}")]
    InvalidFile { filename: String, reason: String },

    /// A migration's `up` or `down` failed; its transaction was rolled back.
    #[error("migration {filename} failed: {source}")]
    Failed {
        filename: String,
        #[source]
        source: DatabaseError,
    },
}

impl From<SqlError> for MigrationError {
    fn from(err: SqlError) -> Self {
        MigrationError::Database(err.into())
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(err: rusqlite::Error) -> Self {
        MigrationError::Database(err.into())
    }
}

impl From<std::io::Error> for MigrationError {
    fn from(err: std::io::Error) -> Self {
        MigrationError::Database(err.into())
    }
}
