//! Table-bound models over the query facade.
//!
//! A [`Model`] names its table and, optionally, the fields it accepts for
//! writes, the fields stripped from reads and its primary key. The provided
//! methods build statements through [`Database`] and execute them. The
//! [`before_insert`](Model::before_insert) and
//! [`before_update`](Model::before_update) hooks may rewrite a payload after
//! fillable filtering.
//!
//! ```
//! use quarry_core::{Query, Record};
//! use quarry_sqlite::{Database, Model};
//!
//! struct User;
//!
//! impl Model for User {
//!     const TABLE: &'static str = "users";
//!     const HIDDEN: &'static [&'static str] = &["password"];
//! }
//!
//! let db = Database::in_memory();
//! db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, password TEXT)").unwrap();
//!
//! let id = User::insert(&db, Record::new().with("name", "ada").with("password", "secret")).unwrap();
//! let user = User::find_by_key(&db, id).unwrap().unwrap();
//! assert_eq!(user.get("password"), None);
//! assert_eq!(User::count(&db, &Query::new()).unwrap(), 1);
//! ```

use quarry_core::{Condition, Query, Record, SqlError, Value, Where};

use crate::database::Database;
use crate::error::Result;

pub trait Model {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    /// Fields accepted by writes. Empty accepts every column of the table.
    const FILLABLE: &'static [&'static str] = &[];
    /// Fields removed from every row a read returns.
    const HIDDEN: &'static [&'static str] = &[];

    fn before_insert(record: Record) -> Record {
        record
    }

    fn before_update(record: Record) -> Record {
        record
    }

    /// `record` without its hidden fields.
    fn retract(record: Record) -> Record {
        record.without(Self::HIDDEN)
    }

    /// First row matching `query`.
    fn find(db: &Database, query: &Query) -> Result<Option<Record>> {
        let stmt = db.select(Self::TABLE, &query.clone().limit(1))?;
        let row = stmt.fetch_one(db)?;
        Ok(row.map(|row| Self::retract(Record::from(row))))
    }

    fn find_by_key(db: &Database, key: impl Into<Value>) -> Result<Option<Record>> {
        let key: Value = key.into();
        let query = Query::new().filter(Where::new().eq(Self::PRIMARY_KEY, key));
        Self::find(db, &query)
    }

    fn find_many(db: &Database, query: &Query) -> Result<Vec<Record>> {
        let stmt = db.select(Self::TABLE, query)?;
        let rows = stmt.fetch_all(db)?;
        Ok(rows.into_iter().map(|row| Self::retract(Record::from(row))).collect())
    }

    /// Rows matching `query`, ignoring its limit and offset.
    fn count(db: &Database, query: &Query) -> Result<i64> {
        let stmt = db.count(Self::TABLE, query)?;
        let count = stmt.fetch_column(db)?.first().and_then(|value| value.as_i64());
        Ok(count.unwrap_or(0))
    }

    /// Whether the table exists.
    fn exists(db: &Database) -> Result<bool> {
        Ok(!db.table_columns(Self::TABLE)?.is_empty())
    }

    fn has_column(db: &Database, column: &str) -> Result<bool> {
        Ok(db.table_columns(Self::TABLE)?.iter().any(|known| known == column))
    }

    /// Inserts one row and returns its row id.
    fn insert(db: &Database, record: Record) -> Result<i64> {
        let record = Self::before_insert(fillable::<Self>(record));
        let stmt = db.insert(Self::TABLE, &record)?;
        Ok(stmt.execute(db)?.last_insert_id)
    }

    /// Inserts every row in one statement and returns the number inserted.
    fn insert_many(db: &Database, rows: Vec<Record>) -> Result<usize> {
        let rows: Vec<Record> = rows
            .into_iter()
            .map(|row| Self::before_insert(fillable::<Self>(row)))
            .collect();
        Ok(db.insert_many(Self::TABLE, &rows)?.affected(db)?)
    }

    fn update(db: &Database, record: Record, condition: impl Into<Condition>) -> Result<usize> {
        let record = Self::before_update(fillable::<Self>(record));
        Ok(db.update(Self::TABLE, &record, condition)?.affected(db)?)
    }

    /// Updates the row whose primary key is carried by `record`.
    ///
    /// # Errors
    ///
    /// [`SqlError::EmptyCondition`] when `record` has no primary key field.
    fn update_by_key(db: &Database, record: Record) -> Result<usize> {
        let Some(key) = record.get(Self::PRIMARY_KEY).cloned() else {
            return Err(SqlError::EmptyCondition(quarry_core::quote(Self::TABLE)).into());
        };
        let payload = record.without(&[Self::PRIMARY_KEY]);
        Self::update(db, payload, Where::new().eq(Self::PRIMARY_KEY, key))
    }

    fn delete(db: &Database, condition: impl Into<Condition>) -> Result<usize> {
        Ok(db.delete(Self::TABLE, condition)?.affected(db)?)
    }

    fn delete_by_key(db: &Database, key: impl Into<Value>) -> Result<usize> {
        let key: Value = key.into();
        Self::delete(db, Where::new().eq(Self::PRIMARY_KEY, key))
    }
}

fn fillable<M: Model + ?Sized>(record: Record) -> Record {
    if M::FILLABLE.is_empty() {
        return record;
    }
    let columns: Vec<String> = M::FILLABLE.iter().map(|c| c.to_string()).collect();
    record.only(&columns)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quarry_core::Order;

    use super::*;
    use crate::error::DatabaseError;

    struct Post;

    impl Model for Post {
        const TABLE: &'static str = "posts";
        const FILLABLE: &'static [&'static str] = &["title", "slug", "views"];
        const HIDDEN: &'static [&'static str] = &["draft_notes"];

        fn before_insert(record: Record) -> Record {
            let slug = record
                .get("title")
                .and_then(Value::as_str)
                .map(|title| title.to_lowercase().replace(' ', "-"));
            match slug {
                Some(slug) => record.with("slug", slug),
                None => record,
            }
        }

        fn before_update(record: Record) -> Record {
            record.with("views", 0)
        }
    }

    fn setup() -> Database {
        let db = Database::in_memory();
        db.execute_batch(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, slug TEXT, views INTEGER DEFAULT 0, \
             draft_notes TEXT DEFAULT 'todo')",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_insert_applies_fillable_then_hook() {
        let db = setup();
        let record = Record::new().with("title", "Hello World").with("id", 99).with("draft_notes", "x");
        let id = Post::insert(&db, record).unwrap();
        assert_eq!(id, 1);

        let raw = db.raw("SELECT slug, draft_notes FROM posts WHERE id = 1", vec![]).unwrap();
        let row = raw.fetch_one(&db).unwrap().unwrap();
        assert_eq!(row.get("slug"), Some(&Value::Text("hello-world".into())));
        assert_eq!(row.get("draft_notes"), Some(&Value::Text("todo".into())));
    }

    #[test]
    fn test_reads_retract_hidden_fields() {
        let db = setup();
        Post::insert(&db, Record::new().with("title", "a")).unwrap();
        let post = Post::find_by_key(&db, 1).unwrap().unwrap();
        assert_eq!(post.keys().collect::<Vec<_>>(), ["id", "title", "slug", "views"]);
        assert_eq!(Post::find_by_key(&db, 2).unwrap(), None);
    }

    #[test]
    fn test_find_many_and_count() {
        let db = setup();
        let rows = vec![
            Record::new().with("title", "a").with("views", 5),
            Record::new().with("title", "b").with("views", 50),
            Record::new().with("title", "c").with("views", 500),
        ];
        assert_eq!(Post::insert_many(&db, rows).unwrap(), 3);

        let query = Query::new().filter(Where::new().op("views", "gte", 50)).order(Order::new().desc("views"));
        let popular = Post::find_many(&db, &query).unwrap();
        let slugs: Vec<_> = popular.iter().filter_map(|p| p.get("slug")).collect();
        assert_eq!(slugs, [&Value::Text("c".into()), &Value::Text("b".into())]);
        assert_eq!(Post::count(&db, &query.limit(1)).unwrap(), 2);
        assert_eq!(Post::find(&db, &Query::new()).unwrap().and_then(|p| p.get("id").cloned()), Some(Value::Int(1)));
    }

    #[test]
    fn test_update_and_delete_by_key() {
        let db = setup();
        Post::insert(&db, Record::new().with("title", "a").with("views", 7)).unwrap();
        Post::insert(&db, Record::new().with("title", "b").with("views", 8)).unwrap();

        let changed = Post::update_by_key(&db, Record::new().with("id", 2).with("title", "bb")).unwrap();
        assert_eq!(changed, 1);
        let post = Post::find_by_key(&db, 2).unwrap().unwrap();
        assert_eq!(post.get("title"), Some(&Value::Text("bb".into())));
        assert_eq!(post.get("views"), Some(&Value::Int(0)));

        let err = Post::update_by_key(&db, Record::new().with("title", "x")).unwrap_err();
        assert!(matches!(err, DatabaseError::Sql(SqlError::EmptyCondition(_))));

        assert_eq!(Post::delete_by_key(&db, 1).unwrap(), 1);
        assert!(Post::delete(&db, Where::new()).is_err());
        assert_eq!(Post::delete(&db, "1").unwrap(), 1);
        assert_eq!(Post::count(&db, &Query::new()).unwrap(), 0);
    }

    #[test]
    fn test_table_introspection() {
        let db = setup();
        assert!(Post::exists(&db).unwrap());
        assert!(Post::has_column(&db, "slug").unwrap());
        assert!(!Post::has_column(&db, "author").unwrap());

        struct Missing;
        impl Model for Missing {
            const TABLE: &'static str = "missing";
        }
        assert!(!Missing::exists(&db).unwrap());
    }
}
