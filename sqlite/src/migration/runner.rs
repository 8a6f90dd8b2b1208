//! Applying, reverting and creating migrations.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{Datelike, Timelike, Utc};
use heck::ToSnakeCase;
use quarry_core::{Order, Query, Record, Row, Statement, Value, Where, args, quote};
use regex::Regex;
use tracing::{debug, info, warn};

use super::file::{self, MigrationFile, SqlMigration};
use super::{Migration, MigrationContext, MigrationRegistry};
use crate::database::Database;
use crate::error::{DatabaseError, MigrationError};

type MigrateResult<T> = std::result::Result<T, MigrationError>;

static CLASS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("static regex must compile"));

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: i64,
    pub filename: Option<String>,
    /// Class name of the applied migration.
    pub name: Option<String>,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub breakpoint: i64,
}

impl MigrationRecord {
    fn from_row(row: &Row<'_>) -> Self {
        let text = |column: &str| row.get(column).and_then(Value::as_str).map(String::from);
        Self {
            version: row.get("version").and_then(Value::as_i64).unwrap_or_default(),
            filename: text("filename"),
            name: text("name"),
            start_at: text("start_at"),
            end_at: text("end_at"),
            breakpoint: row.get("breakpoint").and_then(Value::as_i64).unwrap_or_default(),
        }
    }

    fn matches(&self, file: &MigrationFile) -> bool {
        self.version == file.version || self.name.as_deref() == Some(file.class_name.as_str())
    }
}

/// Outcome of [`Migrator::run`] or [`Migrator::rollback`].
///
/// All lists hold file names, in the order the files were visited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub invalid: Vec<String>,
    /// SQL a dry run would have executed.
    pub planned: Vec<String>,
    /// Whether the bookkeeping table was created by this run.
    pub table_created: bool,
}

/// A discovered migration file and its bookkeeping row, if applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub file: MigrationFile,
    pub record: Option<MigrationRecord>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.record.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub entries: Vec<MigrationStatus>,
    pub invalid: Vec<String>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &MigrationStatus> {
        self.entries.iter().filter(|entry| !entry.is_applied())
    }

    pub fn applied(&self) -> impl Iterator<Item = &MigrationStatus> {
        self.entries.iter().filter(|entry| entry.is_applied())
    }
}

enum Resolved<'r> {
    Registered(&'r dyn Migration),
    Sql(SqlMigration),
}

impl Resolved<'_> {
    fn migration(&self) -> &dyn Migration {
        match self {
            Resolved::Registered(migration) => *migration,
            Resolved::Sql(migration) => migration,
        }
    }
}

/// Runs the migrations of one directory against one database.
///
/// Directory, schema and bookkeeping table default to the database config.
pub struct Migrator<'a> {
    db: &'a Database,
    registry: MigrationRegistry,
    directory: PathBuf,
    schema: String,
    table: String,
}

impl<'a> Migrator<'a> {
    pub fn new(db: &'a Database) -> Self {
        let config = db.config();
        Self {
            db,
            registry: MigrationRegistry::new(),
            directory: config.migrations_path.clone(),
            schema: config.schema.clone(),
            table: config.migrations_table.clone(),
        }
    }

    pub fn with_registry(mut self, registry: MigrationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Applies every pending migration in ascending version order.
    ///
    /// A file is skipped when a bookkeeping row matches its version or its
    /// class name. Each migration runs in its own `BEGIN IMMEDIATE`
    /// transaction; the first failure is rolled back and ends the run.
    pub fn run(&self, dry_run: bool) -> MigrateResult<MigrationReport> {
        let dir = self.prepare_directory()?;
        let mut report = MigrationReport {
            table_created: self.ensure_table()?,
            ..MigrationReport::default()
        };
        let (files, invalid) = file::discover(&dir)?;
        report.invalid = invalid;

        for file in &files {
            debug!(file = %file.filename, "considering migration");
            let Some(resolved) = self.resolve(file)? else {
                report.invalid.push(file.filename.clone());
                continue;
            };
            if self.find_record(file)?.is_some() {
                debug!(file = %file.filename, "already applied");
                report.skipped.push(file.filename.clone());
                continue;
            }
            match self.apply(file, resolved.migration(), dry_run)? {
                Some(planned) => {
                    info!(file = %file.filename, dry_run, "migrated");
                    report.planned.extend(planned);
                    report.processed.push(file.filename.clone());
                }
                None => report.skipped.push(file.filename.clone()),
            }
        }
        Ok(report)
    }

    /// Reverts applied migrations in descending version order.
    ///
    /// With a `target`, stops at the first file whose version is at or below
    /// it; without one, reverts only the most recent applied migration.
    /// Files with no bookkeeping row are skipped.
    pub fn rollback(&self, target: Option<i64>, dry_run: bool) -> MigrateResult<MigrationReport> {
        let dir = self.prepare_directory()?;
        let mut report = MigrationReport {
            table_created: self.ensure_table()?,
            ..MigrationReport::default()
        };
        let (mut files, invalid) = file::discover(&dir)?;
        files.reverse();
        report.invalid = invalid;

        for file in &files {
            debug!(file = %file.filename, "considering rollback");
            if target.is_some_and(|target| target >= file.version) {
                break;
            }
            let Some(resolved) = self.resolve(file)? else {
                report.invalid.push(file.filename.clone());
                continue;
            };
            if self.find_record(file)?.is_none() {
                debug!(file = %file.filename, "not applied");
                report.skipped.push(file.filename.clone());
                continue;
            }
            match self.revert(file, resolved.migration(), dry_run)? {
                Some(planned) => {
                    info!(file = %file.filename, dry_run, "rolled back");
                    report.planned.extend(planned);
                    report.processed.push(file.filename.clone());
                }
                None => {
                    report.skipped.push(file.filename.clone());
                    continue;
                }
            }
            if target.is_none() {
                break;
            }
        }
        Ok(report)
    }

    /// Every discovered migration with its bookkeeping row.
    ///
    /// Does not create the bookkeeping table; without it, all are pending.
    pub fn status(&self) -> MigrateResult<StatusReport> {
        let dir = self.prepare_directory()?;
        let (files, invalid) = file::discover(&dir)?;
        let records = self.applied()?;

        let entries = files
            .into_iter()
            .map(|file| {
                let record = records.iter().find(|record| record.matches(&file)).cloned();
                MigrationStatus { file, record }
            })
            .collect();
        Ok(StatusReport { entries, invalid })
    }

    /// Bookkeeping rows in version order; empty when the table is missing.
    pub fn applied(&self) -> MigrateResult<Vec<MigrationRecord>> {
        if !self.table_exists()? {
            return Ok(Vec::new());
        }
        let query = Query::new().order(Order::new().asc("version"));
        let stmt = self.db.select(self.table_name()?, &query)?;
        let records = stmt
            .fetch_all(self.db)?
            .iter()
            .map(MigrationRecord::from_row)
            .collect();
        Ok(records)
    }

    /// Writes a new, empty SQL migration named after `class_name` and
    /// returns its path.
    ///
    /// # Errors
    ///
    /// [`MigrationError::InvalidName`] unless `class_name` is PascalCase;
    /// [`MigrationError::Duplicate`] when a migration with the same class
    /// name exists and `force` is not set. With `force` the old file is
    /// replaced.
    pub fn create(&self, class_name: &str, force: bool) -> MigrateResult<PathBuf> {
        if !CLASS_NAME.is_match(class_name) {
            return Err(MigrationError::InvalidName(class_name.to_string()));
        }
        let dir = self.prepare_directory()?;
        let (files, _) = file::discover(&dir)?;

        for existing in files.iter().filter(|f| f.class_name == class_name) {
            if !force {
                return Err(MigrationError::Duplicate(existing.filename.clone()));
            }
            warn!(file = %existing.filename, "replacing existing migration");
            std::fs::remove_file(&existing.path)?;
        }

        let mut version = version_now();
        while files.iter().any(|f| f.version == version) {
            version += 1;
        }

        let path = dir.join(format!("{version}_{}.sql", class_name.to_snake_case()));
        if path.exists() && !force {
            return Err(MigrationError::Duplicate(path.display().to_string()));
        }
        std::fs::write(&path, SqlMigration::template(class_name))?;
        info!(path = %path.display(), "created migration");
        Ok(path)
    }

    /// Creates the bookkeeping table unless it exists. Returns `true` when
    /// it was created.
    pub fn ensure_table(&self) -> MigrateResult<bool> {
        if self.table_exists()? {
            return Ok(false);
        }
        let table = self.table_name()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
    `version` BIGINT NOT NULL,
    `filename` VARCHAR(255) NULL DEFAULT NULL,
    `name` VARCHAR(50) NULL DEFAULT NULL,
    `start_at` TIMESTAMP NULL DEFAULT NULL,
    `end_at` TIMESTAMP NULL DEFAULT NULL,
    `breakpoint` INT NULL DEFAULT 0,
    PRIMARY KEY (`version`)
)",
            quarry_core::table_name(&table)
        );
        self.db.execute_batch(&sql)?;
        info!(table = %table, "created migrations table");
        Ok(true)
    }

    fn table_exists(&self) -> MigrateResult<bool> {
        self.table_name()?;
        let stmt = Statement::build(
            &format!(
                "SELECT 1 FROM {}.sqlite_master WHERE `type` = 'table' AND `name` = ?",
                quote(&self.schema)
            ),
            args![self.table.as_str()],
        )?;
        Ok(stmt.fetch_one(self.db)?.is_some())
    }

    /// `schema.table`, after checking both are plain identifiers.
    fn table_name(&self) -> crate::error::Result<String> {
        for name in [&self.schema, &self.table] {
            if !quarry_core::is_identifier(name) {
                return Err(DatabaseError::ConfigError(format!("invalid migrations table '{name}'")));
            }
        }
        Ok(format!("{}.{}", self.schema, self.table))
    }

    /// Creates the directory when missing and checks it is usable.
    fn prepare_directory(&self) -> MigrateResult<PathBuf> {
        let path = &self.directory;
        let directory_error = |reason: &str| MigrationError::Directory {
            path: path.clone(),
            reason: reason.to_string(),
        };
        if path.as_os_str().is_empty() {
            return Err(directory_error("empty path"));
        }
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|err| directory_error(&err.to_string()))?;
            info!(path = %path.display(), "created migrations directory");
        }
        let metadata = std::fs::metadata(path).map_err(|err| directory_error(&err.to_string()))?;
        if !metadata.is_dir() {
            return Err(directory_error("not a directory"));
        }
        if metadata.permissions().readonly() {
            return Err(directory_error("not writable"));
        }
        std::fs::canonicalize(path).map_err(|err| directory_error(&err.to_string()))
    }

    /// Registered migrations win over `.sql` files. `None` means invalid.
    fn resolve(&self, file: &MigrationFile) -> MigrateResult<Option<Resolved<'_>>> {
        if let Some(migration) = self.registry.get(&file.class_name) {
            return Ok(Some(Resolved::Registered(migration)));
        }
        if !file.is_sql() {
            warn!(file = %file.filename, class = %file.class_name, "no registered migration for file");
            return Ok(None);
        }
        match SqlMigration::load(&file.path) {
            Ok(migration) => Ok(Some(Resolved::Sql(migration))),
            Err(MigrationError::InvalidFile { reason, .. }) => {
                warn!(file = %file.filename, %reason, "invalid migration file");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn find_record(&self, file: &MigrationFile) -> crate::error::Result<Option<MigrationRecord>> {
        let table = self.table_name()?;
        let filter = Where::new()
            .eq("version", file.version)
            .eq("or name", file.class_name.as_str());
        let stmt = self.db.select(table, &Query::new().filter(filter).limit(1))?;
        let record = stmt.fetch_one(self.db)?.map(|row| MigrationRecord::from_row(&row));
        Ok(record)
    }

    /// Runs `up` and records it. `None` when another runner got there first.
    fn apply(&self, file: &MigrationFile, migration: &dyn Migration, dry_run: bool) -> MigrateResult<Option<Vec<String>>> {
        let ctx = MigrationContext::new(self.db, dry_run);
        if dry_run {
            migration.up(&ctx).map_err(|source| failed(file, source))?;
            return Ok(Some(ctx.into_planned()));
        }

        let table = self.table_name()?;
        self.db.begin_immediate()?;
        let outcome = self.find_record(file).and_then(|existing| {
            if existing.is_some() {
                return Ok(false);
            }
            let start_at = now();
            migration.up(&ctx)?;
            let record = Record::new()
                .with("version", file.version)
                .with("filename", file.filename.as_str())
                .with("name", file.class_name.as_str())
                .with("start_at", start_at)
                .with("end_at", now())
                .with("breakpoint", 0);
            self.db.insert(table.as_str(), &record)?.execute(self.db)?;
            Ok(true)
        });
        self.finish(file, outcome)
    }

    /// Runs `down` and deletes the record. `None` when it is already gone.
    fn revert(&self, file: &MigrationFile, migration: &dyn Migration, dry_run: bool) -> MigrateResult<Option<Vec<String>>> {
        let ctx = MigrationContext::new(self.db, dry_run);
        if dry_run {
            migration.down(&ctx).map_err(|source| failed(file, source))?;
            return Ok(Some(ctx.into_planned()));
        }

        let table = self.table_name()?;
        self.db.begin_immediate()?;
        let outcome = self.find_record(file).and_then(|existing| {
            let Some(record) = existing else {
                return Ok(false);
            };
            migration.down(&ctx)?;
            self.db
                .delete(table.as_str(), Where::new().eq("version", record.version))?
                .execute(self.db)?;
            Ok(true)
        });
        self.finish(file, outcome)
    }

    fn finish(
        &self,
        file: &MigrationFile,
        outcome: crate::error::Result<bool>,
    ) -> MigrateResult<Option<Vec<String>>> {
        match outcome {
            Ok(true) => {
                self.db.commit()?;
                Ok(Some(Vec::new()))
            }
            Ok(false) => {
                self.db.rollback()?;
                Ok(None)
            }
            Err(source) => {
                if let Err(err) = self.db.rollback() {
                    warn!(file = %file.filename, error = %err, "rollback failed");
                }
                Err(failed(file, source))
            }
        }
    }
}

fn failed(file: &MigrationFile, source: DatabaseError) -> MigrationError {
    MigrationError::Failed {
        filename: file.filename.clone(),
        source,
    }
}

/// The current UTC time as a `YYYYMMDDhhmmss` number.
fn version_now() -> i64 {
    let now = Utc::now();
    [now.month(), now.day(), now.hour(), now.minute(), now.second()]
        .into_iter()
        .fold(i64::from(now.year()), |acc, part| acc * 100 + i64::from(part))
}

fn now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}
