//! Versioned schema migrations.
//!
//! A migration directory holds files named `<version>_<snake_name>.<ext>`.
//! Each file is resolved to a [`Migration`]: a registered implementation
//! whose class name (the PascalCase form of the snake name) matches, or, for
//! `.sql` files, an [`SqlMigration`] read from `-- migrate:up` /
//! `-- migrate:down` sections. The [`Migrator`] applies pending migrations in
//! ascending version order and records each in a bookkeeping table.
//!
//! # Example
//!
//! ```no_run
//! use quarry_sqlite::{Database, DatabaseConfig, Migrator};
//!
//! let db = Database::new(DatabaseConfig::load("quarry.yml").unwrap());
//! let report = Migrator::new(&db).run(false).unwrap();
//! println!("processed {}, skipped {}", report.processed.len(), report.skipped.len());
//! ```

mod file;
mod registry;
mod runner;

use std::cell::RefCell;

use quarry_core::{Param, Statement};
use tracing::debug;

use crate::database::Database;
use crate::error::Result;

pub use file::{MigrationFile, SqlMigration};
pub use registry::MigrationRegistry;
pub use runner::{MigrationRecord, MigrationReport, MigrationStatus, Migrator, StatusReport};

/// One reversible schema change.
pub trait Migration {
    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    /// Reverts [`up`](Self::up). Does nothing unless overridden.
    fn down(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// What a migration sees while it runs.
///
/// In dry-run mode statements are rendered and collected instead of executed.
pub struct MigrationContext<'a> {
    db: &'a Database,
    dry_run: bool,
    planned: RefCell<Vec<String>>,
}

impl<'a> MigrationContext<'a> {
    pub(crate) fn new(db: &'a Database, dry_run: bool) -> Self {
        Self {
            db,
            dry_run,
            planned: RefCell::new(Vec::new()),
        }
    }

    /// The database, for reads a migration needs regardless of dry-run.
    ///
    /// Statements run through this handle bypass plan collection: they
    /// execute even in a dry run and never show up in the report. Route
    /// writes through [`query`](Self::query), [`execute`](Self::execute),
    /// [`statement`](Self::statement) or [`batch`](Self::batch), or check
    /// [`is_dry_run`](Self::is_dry_run) first.
    pub fn db(&self) -> &'a Database {
        self.db
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Builds a statement and executes it unless this is a dry run.
    ///
    /// The returned statement carries the cached result when it ran.
    pub fn query(&self, template: &str, args: Vec<Param>) -> Result<Statement> {
        let stmt = Statement::build(template, args)?;
        self.statement(&stmt)?;
        Ok(stmt)
    }

    /// Like [`query`](Self::query), returning the number of affected rows.
    pub fn execute(&self, template: &str, args: Vec<Param>) -> Result<usize> {
        let stmt = Statement::build(template, args)?;
        self.statement(&stmt)
    }

    /// Executes an already built statement unless this is a dry run.
    pub fn statement(&self, stmt: &Statement) -> Result<usize> {
        if self.dry_run {
            self.plan(stmt.to_string());
            return Ok(0);
        }
        Ok(stmt.affected(self.db)?)
    }

    /// Runs a multi-statement SQL script unless this is a dry run.
    pub fn batch(&self, script: &str) -> Result<()> {
        if self.dry_run {
            self.plan(script.trim().to_string());
            return Ok(());
        }
        self.db.execute_batch(script)
    }

    fn plan(&self, sql: String) {
        debug!(sql = %sql, "dry run");
        self.planned.borrow_mut().push(sql);
    }

    pub(crate) fn into_planned(self) -> Vec<String> {
        self.planned.into_inner()
    }
}
