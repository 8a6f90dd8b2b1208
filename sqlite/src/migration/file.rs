//! Migration file discovery and SQL migration files.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use heck::ToUpperCamelCase;
use regex::Regex;
use tracing::debug;

use super::{Migration, MigrationContext};
use crate::error::{MigrationError, Result};

static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)_([a-z][a-z0-9_]*)\.([A-Za-z0-9]+)$").expect("static regex must compile")
});
static SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^--\s*migrate:(up|down)\s*$").expect("static regex must compile")
});

/// A file in the migrations directory whose name parsed as
/// `<version>_<snake_name>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: i64,
    /// The snake_case name from the file name.
    pub name: String,
    /// The PascalCase class name used to look the migration up.
    pub class_name: String,
    pub filename: String,
    pub extension: String,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Parses a migration file path. Returns `None` for names that do not
    /// follow the `<version>_<snake_name>.<ext>` pattern.
    pub fn parse(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_str()?;
        let caps = FILENAME.captures(filename)?;
        let version = caps[1].parse().ok()?;
        let name = caps[2].to_string();
        Some(Self {
            version,
            class_name: name.to_upper_camel_case(),
            name,
            filename: filename.to_string(),
            extension: caps[3].to_string(),
            path: path.to_path_buf(),
        })
    }

    pub fn is_sql(&self) -> bool {
        self.extension.eq_ignore_ascii_case("sql")
    }
}

/// Lists the migration files in `dir`, ascending by version then file name,
/// along with the names of entries that are not valid migration files.
///
/// Hidden files and subdirectories are ignored.
pub(crate) fn discover(dir: &Path) -> Result<(Vec<MigrationFile>, Vec<String>)> {
    let mut files = Vec::new();
    let mut invalid = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();
        if filename.starts_with('.') {
            continue;
        }
        match MigrationFile::parse(&path) {
            Some(file) => files.push(file),
            None => invalid.push(filename),
        }
    }

    files.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.filename.cmp(&b.filename)));
    invalid.sort();
    debug!(dir = %dir.display(), files = files.len(), invalid = invalid.len(), "discovered migrations");
    Ok((files, invalid))
}

/// A migration stored as plain SQL with `-- migrate:up` and
/// `-- migrate:down` section markers.
///
/// ```
/// use quarry_sqlite::SqlMigration;
///
/// let migration = SqlMigration::parse("-- migrate:up\nCREATE TABLE t (id INTEGER);\n-- migrate:down\nDROP TABLE t;\n").unwrap();
/// assert_eq!(migration.up_sql(), "CREATE TABLE t (id INTEGER);");
/// assert_eq!(migration.down_sql(), "DROP TABLE t;");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlMigration {
    up: String,
    down: String,
}

impl SqlMigration {
    pub fn new(up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            up: up.into(),
            down: down.into(),
        }
    }

    /// Splits a script into its sections. Returns `None` without an up marker.
    pub fn parse(text: &str) -> Option<Self> {
        let mut up: Option<Vec<&str>> = None;
        let mut down: Vec<&str> = Vec::new();
        let mut current: Option<bool> = None;

        for line in text.lines() {
            if let Some(caps) = SECTION.captures(line.trim()) {
                let is_up = caps[1].eq_ignore_ascii_case("up");
                if is_up {
                    up.get_or_insert_with(Vec::new);
                }
                current = Some(is_up);
                continue;
            }
            match current {
                Some(true) => up.get_or_insert_with(Vec::new).push(line),
                Some(false) => down.push(line),
                None => {}
            }
        }

        Some(Self {
            up: up?.join("\n").trim().to_string(),
            down: down.join("\n").trim().to_string(),
        })
    }

    /// Reads and parses a migration file.
    pub fn load(path: &Path) -> std::result::Result<Self, MigrationError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).ok_or_else(|| MigrationError::InvalidFile {
            filename: path.display().to_string(),
            reason: "missing `-- migrate:up` section".to_string(),
        })
    }

    pub fn up_sql(&self) -> &str {
        &self.up
    }

    pub fn down_sql(&self) -> &str {
        &self.down
    }

    /// The file body written by `make-migration`.
    pub(crate) fn template(class_name: &str) -> String {
        format!("-- {class_name}\n-- migrate:up\n\n\n-- migrate:down\n\n")
    }
}

impl Migration for SqlMigration {
    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        if self.up.is_empty() {
            return Ok(());
        }
        ctx.batch(&self.up)
    }

    fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        if self.down.is_empty() {
            return Ok(());
        }
        ctx.batch(&self.down)
    }
}
