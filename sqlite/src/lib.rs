//! SQLite backend for quarry.
//!
//! This crate binds the statement builders of [`quarry_core`] to a SQLite
//! connection and adds a file-backed schema migration runner.
//!
//! # Architecture
//!
//! - **`database`**: the lazily opened connection, transactions and history
//! - **`catalog`**: cached column lookups used to filter write payloads
//! - **`query`**: builder methods on [`Database`] (select/insert/update/…)
//! - **`model`**: table-bound [`Model`] trait with write hooks and hidden fields
//! - **`config`**: YAML configuration with alternative key spellings
//! - **`migration`**: discovery, registry, apply/rollback/status/create
//!
//! # Quick start: queries
//!
//! ```
//! use quarry_core::{Order, Query, Record, Where};
//! use quarry_sqlite::Database;
//!
//! let db = Database::in_memory();
//! db.execute_batch("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, views INTEGER)").unwrap();
//! db.insert("posts", &Record::new().with("title", "hello").with("views", 10)).unwrap().execute(&db).unwrap();
//!
//! let query = Query::new()
//!     .columns(vec!["id", "title"])
//!     .filter(Where::new().op("views", ">", 5))
//!     .order(Order::new().desc("views"));
//! let popular = db.select("posts", &query).unwrap();
//! assert_eq!(popular.fetch_all(&db).unwrap().len(), 1);
//! ```
//!
//! # Quick start: migrations
//!
//! ```no_run
//! use quarry_sqlite::{Database, DatabaseConfig, Migrator};
//!
//! let db = Database::new(DatabaseConfig::load("quarry.yml").unwrap());
//! let migrator = Migrator::new(&db);
//! migrator.create("CreatePosts", false).unwrap();
//!
//! let report = migrator.run(false).unwrap();
//! println!("processed {}", report.processed.len());
//! ```

mod catalog;
mod config;
mod convert;
mod database;
mod error;
mod migration;
mod model;
mod query;

pub use catalog::SchemaCatalog;
pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{DatabaseError, MigrationError, Result};
pub use model::Model;
pub use migration::{
    Migration, MigrationContext, MigrationFile, MigrationRecord, MigrationRegistry, MigrationReport,
    MigrationStatus, Migrator, SqlMigration, StatusReport,
};
