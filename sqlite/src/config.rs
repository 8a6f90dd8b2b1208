//! Database and migration configuration.
//!
//! Loaded from a YAML file (typically `quarry.yml`). Several keys accept
//! alternative spellings.
//!
//! # Example YAML
//!
//! ```yaml
//! database: app.db        # or: dbname, db_name, db, path
//! schema: main
//! migrations_path: db/migrations   # or: migration_path, migrations, migration
//! migrations_table: migrations     # or: migration_table
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Connection and migration settings.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file; `:memory:` opens an in-memory database.
    #[serde(alias = "dbname", alias = "db_name", alias = "db", alias = "path")]
    pub database: Option<PathBuf>,
    /// Attached database name used for catalog lookups.
    pub schema: String,
    #[serde(alias = "migration_path", alias = "migrations", alias = "migration")]
    pub migrations_path: PathBuf,
    #[serde(alias = "migration_table")]
    pub migrations_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: None,
            schema: "main".to_string(),
            migrations_path: PathBuf::from("migrations"),
            migrations_table: "migrations".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Configuration for an in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database: Some(PathBuf::from(":memory:")),
            ..Self::default()
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DatabaseError::IoError) if the file cannot be
    /// read, or [`YamlError`](DatabaseError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&text)?;
        config.validated()
    }

    /// Checks values that would otherwise fail late, at first use.
    pub fn validated(self) -> Result<Self> {
        if !quarry_core::is_identifier(&self.schema) {
            return Err(DatabaseError::ConfigError(format!("invalid schema name '{}'", self.schema)));
        }
        if !quarry_core::is_identifier(&self.migrations_table) {
            return Err(DatabaseError::ConfigError(format!(
                "invalid migrations table name '{}'",
                self.migrations_table
            )));
        }
        if self.migrations_path.as_os_str().is_empty() {
            return Err(DatabaseError::ConfigError("empty migrations path".to_string()));
        }
        Ok(self)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.as_deref() == Some(Path::new(":memory:"))
    }
}
