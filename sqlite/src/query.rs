//! The query facade: statement builders bound to a [`Database`].
//!
//! Each method returns an unexecuted [`Statement`]; run it with
//! [`Statement::execute`] or one of the fetch helpers. Write builders consult
//! the schema catalog and drop payload fields that name no column.
//!
//! # Example
//!
//! ```
//! use quarry_core::{Query, Record, Where};
//! use quarry_sqlite::Database;
//!
//! let db = Database::in_memory();
//! db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)").unwrap();
//!
//! let record = Record::new().with("name", "ada").with("age", 36).with("unknown", 1);
//! db.insert("users", &record).unwrap().execute(&db).unwrap();
//!
//! let adults = db.select("users", &Query::new().filter(Where::new().op("age", "gte", 18))).unwrap();
//! let rows = adults.fetch_all(&db).unwrap();
//! assert_eq!(rows[0].get("name").and_then(|v| v.as_str()), Some("ada"));
//! ```

use quarry_core::{Condition, Param, Query, Record, Statement, TableRef};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Columns of `table` from the schema catalog.
    pub fn table_columns(&self, table: impl Into<TableRef>) -> Result<Vec<String>> {
        let rendered = table.into().to_statement().to_string();
        self.catalog().columns(self, &rendered)
    }

    pub fn select(&self, table: impl Into<TableRef>, query: &Query) -> Result<Statement> {
        Ok(quarry_core::select(table, query)?)
    }

    pub fn count(&self, table: impl Into<TableRef>, query: &Query) -> Result<Statement> {
        Ok(quarry_core::count(table, query)?)
    }

    /// Builds an insert of the known-column fields of `record`.
    pub fn insert(&self, table: impl Into<TableRef>, record: &Record) -> Result<Statement> {
        let table = table.into();
        let columns = self.table_columns(table.clone())?;
        Ok(quarry_core::insert(table, record, &columns)?)
    }

    pub fn insert_many(&self, table: impl Into<TableRef>, rows: &[Record]) -> Result<Statement> {
        let table = table.into();
        let columns = self.table_columns(table.clone())?;
        Ok(quarry_core::insert_many(table, rows, &columns)?)
    }

    /// Builds an update. `condition` is required; pass `"1"` to touch every row.
    /// A condition that compiles to nothing (an empty tree, `{}`, `""`) is
    /// rejected with [`SqlError::EmptyCondition`](quarry_core::SqlError::EmptyCondition).
    pub fn update(
        &self,
        table: impl Into<TableRef>,
        record: &Record,
        condition: impl Into<Condition>,
    ) -> Result<Statement> {
        let table = table.into();
        let columns = self.table_columns(table.clone())?;
        Ok(quarry_core::update(table, record, &columns, condition)?)
    }

    /// Builds a delete. `condition` is required; pass `"1"` to delete every row.
    /// Empty conditions are rejected as for [`Database::update`].
    pub fn delete(&self, table: impl Into<TableRef>, condition: impl Into<Condition>) -> Result<Statement> {
        Ok(quarry_core::delete(table, condition)?)
    }

    /// A statement from a template and arguments, bypassing the builders.
    pub fn raw(&self, template: &str, args: Vec<Param>) -> Result<Statement> {
        Ok(Statement::build(template, args)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quarry_core::{SqlError, Value, Where, args};

    use crate::error::DatabaseError;

    use super::*;

    fn setup() -> Database {
        let db = Database::in_memory();
        db.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL DEFAULT 'anon', tags TEXT, age INTEGER)",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_insert_drops_unknown_fields_and_reports_id() {
        let db = setup();
        let record = Record::new().with("name", "ada").with("nickname", "x");
        let stmt = db.insert("users", &record).unwrap();
        assert_eq!(stmt.sql(), "INSERT INTO `users` (`name`) VALUES (:p__0)");
        stmt.execute(&db).unwrap();
        assert_eq!(db.last_insert_id().unwrap(), 1);
    }

    #[test]
    fn test_insert_with_no_known_fields_uses_defaults() {
        let db = setup();
        db.insert("users", &Record::new().with("bogus", 1)).unwrap().execute(&db).unwrap();
        let name = db.raw("SELECT name FROM users WHERE id = ?", args![1]).unwrap();
        assert_eq!(name.fetch_column(&db).unwrap(), vec![&Value::Text("anon".into())]);
    }

    #[test]
    fn test_insert_many_and_count() {
        let db = setup();
        let rows = vec![
            Record::new().with("name", "a").with("age", 20),
            Record::new().with("name", "b").with("age", 15),
            Record::new().with("name", "c"),
        ];
        assert_eq!(db.insert_many("users", &rows).unwrap().affected(&db).unwrap(), 3);

        let query = Query::new().filter(Where::new().op("age", "gte", 18)).limit(1);
        let count = db.count("users", &query).unwrap();
        assert_eq!(count.fetch_column(&db).unwrap(), vec![&Value::Int(1)]);
    }

    #[test]
    fn test_update_and_delete() {
        let db = setup();
        let rows = vec![Record::new().with("name", "a"), Record::new().with("name", "b")];
        db.insert_many("users", &rows).unwrap().execute(&db).unwrap();

        let record = Record::new().with("tags", Value::List(vec!["x".into(), "y".into()]));
        let update = db.update("users", &record, Where::new().eq("name", "a")).unwrap();
        assert_eq!(update.affected(&db).unwrap(), 1);

        let tags = db.raw("SELECT tags FROM users WHERE name = ?", args!["a"]).unwrap();
        assert_eq!(tags.fetch_column(&db).unwrap(), vec![&Value::Text("[\"x\",\"y\"]".into())]);

        assert_eq!(db.delete("users", "1").unwrap().affected(&db).unwrap(), 2);
    }

    #[test]
    fn test_update_with_no_known_fields_is_rejected() {
        let db = setup();
        assert!(db.update("users", &Record::new().with("nope", 1), "1").is_err());
    }

    #[test]
    fn test_empty_condition_leaves_rows_intact() {
        let db = setup();
        let rows = vec![Record::new().with("name", "a"), Record::new().with("name", "b")];
        db.insert_many("users", &rows).unwrap().execute(&db).unwrap();

        let err = db.delete("users", "").unwrap_err();
        assert!(matches!(err, DatabaseError::Sql(SqlError::EmptyCondition(_))));
        let err = db.update("users", &Record::new().with("age", 1), Where::new()).unwrap_err();
        assert!(matches!(err, DatabaseError::Sql(SqlError::EmptyCondition(_))));

        let count = db.count("users", &Query::new()).unwrap();
        assert_eq!(count.fetch_column(&db).unwrap(), vec![&Value::Int(2)]);
        let ages = db.raw("SELECT COUNT(*) FROM users WHERE age IS NULL", vec![]).unwrap();
        assert_eq!(ages.fetch_column(&db).unwrap(), vec![&Value::Int(2)]);
    }

    #[test]
    fn test_raw_fragment_with_or_stays_grouped() {
        let db = setup();
        let rows = vec![
            Record::new().with("name", "a").with("age", 10),
            Record::new().with("name", "b").with("age", 20),
            Record::new().with("name", "c").with("age", 30),
        ];
        db.insert_many("users", &rows).unwrap().execute(&db).unwrap();

        let filter = Where::new().raw("`name` = 'a' OR `name` = 'b'").op("age", "gt", 15);
        let query = Query::new().columns("name").filter(filter);
        let names = db.select("users", &query).unwrap();
        assert_eq!(names.fetch_column(&db).unwrap(), vec![&Value::Text("b".into())]);
    }

    #[test]
    fn test_history_lists_executed_statements() {
        let db = setup();
        db.insert("users", &Record::new().with("name", "o'hara")).unwrap().execute(&db).unwrap();
        db.select("users", &Query::new().columns("name")).unwrap().execute(&db).unwrap();
        assert_eq!(
            db.history()[1..],
            [
                "INSERT INTO `users` (`name`) VALUES ('o''hara')".to_string(),
                "SELECT `name` FROM `users`".to_string(),
            ]
        );
    }
}
