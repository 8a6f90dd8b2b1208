//! The connection manager.
//!
//! [`Database`] owns one lazily opened SQLite connection, the schema catalog
//! and the execution history. It implements [`Executor`], so any
//! [`Statement`](quarry_core::Statement) can be executed against it.

use std::cell::{OnceCell, RefCell};
use std::path::PathBuf;

use quarry_core::{Executor, ResultSet, SqlError, Value};
use rusqlite::{Connection, ToSql};
use tracing::{debug, info};

use crate::catalog::SchemaCatalog;
use crate::config::DatabaseConfig;
use crate::convert;
use crate::error::{DatabaseError, Result};

/// A single memoized SQLite connection plus the state tied to its lifetime.
///
/// The connection is opened on first use. There is no pooling, retry or
/// reconnect, and the type is `!Sync`.
///
/// # Examples
///
/// ```
/// use quarry_sqlite::Database;
///
/// let db = Database::in_memory();
/// db.connection().unwrap().execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
///
/// db.begin_transaction().unwrap();
/// assert!(db.in_transaction());
/// assert!(db.rollback().unwrap());
/// assert!(!db.rollback().unwrap());
/// ```
pub struct Database {
    config: DatabaseConfig,
    conn: OnceCell<Connection>,
    catalog: SchemaCatalog,
    history: RefCell<Vec<String>>,
}

impl Database {
    /// Creates a database handle. Nothing is opened until first use.
    pub fn new(config: DatabaseConfig) -> Self {
        let catalog = SchemaCatalog::new(config.schema.clone());
        Self {
            config,
            conn: OnceCell::new(),
            catalog,
            history: RefCell::new(Vec::new()),
        }
    }

    /// A handle for the database file at `path`, with default settings.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(DatabaseConfig {
            database: Some(path.into()),
            ..DatabaseConfig::default()
        })
    }

    pub fn in_memory() -> Self {
        Self::new(DatabaseConfig::in_memory())
    }

    /// Wraps an already open connection.
    pub fn from_connection(conn: Connection, config: DatabaseConfig) -> Self {
        let db = Self::new(config);
        let _ = db.conn.set(conn);
        db
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub(crate) fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Returns the connection, opening it on first call.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ConfigError`] when no database is configured
    /// or [`DatabaseError::SqliteError`] when it cannot be opened. Failures
    /// are not memoized; the next call tries again.
    pub fn connection(&self) -> Result<&Connection> {
        if let Some(conn) = self.conn.get() {
            return Ok(conn);
        }
        let conn = self.open_connection()?;
        Ok(self.conn.get_or_init(|| conn))
    }

    fn open_connection(&self) -> Result<Connection> {
        let Some(path) = &self.config.database else {
            return Err(DatabaseError::ConfigError("no database path configured".to_string()));
        };
        let conn = if self.config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        info!(database = %path.display(), "opened database");
        Ok(conn)
    }

    /// Starts a deferred transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TransactionActive`] if one is already open.
    pub fn begin_transaction(&self) -> Result<()> {
        self.begin("BEGIN")
    }

    /// Starts a transaction that takes SQLite's write lock immediately.
    pub fn begin_immediate(&self) -> Result<()> {
        self.begin("BEGIN IMMEDIATE")
    }

    fn begin(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        if !conn.is_autocommit() {
            return Err(DatabaseError::TransactionActive);
        }
        conn.execute_batch(sql)?;
        debug!(sql, "transaction started");
        Ok(())
    }

    /// Commits the open transaction. Returns `false` when none was open.
    pub fn commit(&self) -> Result<bool> {
        self.finish("COMMIT")
    }

    /// Rolls back the open transaction. Returns `false` when none was open.
    pub fn rollback(&self) -> Result<bool> {
        self.finish("ROLLBACK")
    }

    fn finish(&self, sql: &str) -> Result<bool> {
        let conn = self.connection()?;
        if conn.is_autocommit() {
            return Ok(false);
        }
        conn.execute_batch(sql)?;
        debug!(sql, "transaction finished");
        Ok(true)
    }

    /// Returns `true` while a transaction is open. An unopened connection has none.
    pub fn in_transaction(&self) -> bool {
        self.conn.get().is_some_and(|conn| !conn.is_autocommit())
    }

    /// Runs a multi-statement SQL script and records it in the history.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.connection()?;
        self.record(sql);
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Executed statements, in call order, with arguments substituted.
    pub fn history(&self) -> Vec<String> {
        self.history.borrow().clone()
    }

    /// Row id of the most recent successful insert on this connection.
    pub fn last_insert_id(&self) -> Result<i64> {
        Ok(self.connection()?.last_insert_rowid())
    }
}

impl Executor for Database {
    fn run(&self, sql: &str, bindings: &[(String, &Value)]) -> quarry_core::Result<ResultSet> {
        let conn = self
            .connection()
            .map_err(|err| SqlError::Connection(err.to_string()))?;
        debug!(sql, bindings = bindings.len(), "executing statement");
        run_prepared(conn, sql, bindings).map_err(|err| SqlError::Execution {
            sql: sql.to_string(),
            message: err.to_string(),
        })
    }

    fn record(&self, statement: &str) {
        self.history.borrow_mut().push(statement.to_string());
    }
}

fn run_prepared(conn: &Connection, sql: &str, bindings: &[(String, &Value)]) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(sql)?;
    let values: Vec<(String, rusqlite::types::Value)> = bindings
        .iter()
        .map(|(name, value)| (format!(":{name}"), convert::to_sql(value)))
        .collect();
    let params: Vec<(&str, &dyn ToSql)> = values
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();

    if stmt.column_count() == 0 {
        let affected = stmt.execute(params.as_slice())?;
        return Ok(ResultSet {
            columns: Vec::new(),
            rows: Vec::new(),
            affected,
            last_insert_id: conn.last_insert_rowid(),
        });
    }

    let readonly = stmt.readonly();
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = stmt.query(params.as_slice())?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get_ref(i).map(convert::from_sql))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        out.push(values);
    }
    drop(rows);

    Ok(ResultSet {
        columns,
        rows: out,
        affected: if readonly { 0 } else { conn.changes() as usize },
        last_insert_id: conn.last_insert_rowid(),
    })
}

#[cfg(test)]
mod tests {
    use quarry_core::{Statement, args};

    use super::*;

    fn db_with_table() -> Database {
        let db = Database::in_memory();
        db.connection()
            .unwrap()
            .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, avatar BLOB)")
            .unwrap();
        db
    }

    #[test]
    fn test_connection_is_memoized() {
        let db = Database::in_memory();
        let first = db.connection().unwrap() as *const Connection;
        let second = db.connection().unwrap() as *const Connection;
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_database_path_is_config_error() {
        let db = Database::new(DatabaseConfig::default());
        assert!(matches!(db.connection(), Err(DatabaseError::ConfigError(_))));
        let err = Statement::raw("SELECT 1").execute(&db).unwrap_err();
        assert!(matches!(err, SqlError::Connection(_)));
    }

    #[test]
    fn test_nested_transactions_are_refused() {
        let db = db_with_table();
        assert!(!db.in_transaction());
        db.begin_transaction().unwrap();
        assert!(matches!(db.begin_immediate(), Err(DatabaseError::TransactionActive)));
        assert!(db.commit().unwrap());
        assert!(!db.commit().unwrap());
    }

    #[test]
    fn test_rollback_discards_writes() {
        let db = db_with_table();
        db.begin_immediate().unwrap();
        Statement::build("INSERT INTO users (name) VALUES (?)", args!["ada"])
            .unwrap()
            .execute(&db)
            .unwrap();
        assert!(db.rollback().unwrap());
        let count = Statement::raw("SELECT COUNT(*) FROM users");
        assert_eq!(count.fetch_column(&db).unwrap(), vec![&Value::Int(0)]);
    }

    #[test]
    fn test_execute_binds_text_and_blob() {
        let db = db_with_table();
        let insert = Statement::build(
            "INSERT INTO users (name, age, avatar) VALUES (?, ?, ?)",
            args!["o'neil", 41, Value::Blob(vec![0, 1, 2])],
        )
        .unwrap();
        let rs = insert.execute(&db).unwrap();
        assert_eq!(rs.affected, 1);
        assert_eq!(rs.last_insert_id, 1);
        assert_eq!(db.last_insert_id().unwrap(), 1);

        let select = Statement::build("SELECT name, avatar FROM users WHERE age = ?", args![41]).unwrap();
        let row = select.fetch_one(&db).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&Value::Text("o'neil".into())));
        assert_eq!(row.get("avatar"), Some(&Value::Blob(vec![0, 1, 2])));
    }

    #[test]
    fn test_history_records_display_form() {
        let db = db_with_table();
        Statement::build("SELECT * FROM users WHERE name = ?", args!["x"])
            .unwrap()
            .execute(&db)
            .unwrap();
        Statement::raw("SELECT 1").execute_quiet(&db).unwrap();
        assert_eq!(db.history(), vec!["SELECT * FROM users WHERE name = 'x'".to_string()]);
    }

    #[test]
    fn test_execution_error_is_soft() {
        let db = db_with_table();
        let stmt = Statement::raw("SELECT * FROM missing");
        let err = stmt.execute(&db).unwrap_err();
        assert!(matches!(err, SqlError::Execution { ref message, .. } if message.contains("no such table")));
        assert_eq!(stmt.last_error(), Some(&err));
    }
}
