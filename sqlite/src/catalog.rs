//! Cached table column lookups.

use std::cell::RefCell;
use std::collections::HashMap;

use quarry_core::{Statement, Value, args, schema_and_table};
use tracing::debug;

use crate::database::Database;
use crate::error::Result;

/// Column names per table, read once from `pragma_table_info`.
///
/// Entries are keyed by bare table name and never invalidated. A lookup that
/// finds no columns (missing table) is not cached, so a table created later
/// is still picked up.
#[derive(Debug)]
pub struct SchemaCatalog {
    schema: String,
    columns: RefCell<HashMap<String, Vec<String>>>,
}

impl SchemaCatalog {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            columns: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the columns of `table`, in column-id order.
    ///
    /// `table` may be any rendered table reference: `` `t` ``,
    /// `` `s`.`t` ``, `s.t` or `t`, optionally followed by `AS alias`.
    /// Anything else (a subquery, a function call) has no known columns.
    pub fn columns(&self, db: &Database, table: &str) -> Result<Vec<String>> {
        let Some((schema, name)) = schema_and_table(table) else {
            return Ok(Vec::new());
        };
        if let Some(cached) = self.columns.borrow().get(&name) {
            return Ok(cached.clone());
        }

        let schema = schema.unwrap_or_else(|| self.schema.clone());
        let lookup = Statement::build(
            "SELECT `name` FROM pragma_table_info(?, ?) ORDER BY `cid`",
            args![name.as_str(), schema.as_str()],
        )?;
        let columns: Vec<String> = lookup
            .execute_quiet(db)?
            .column_values(0)
            .into_iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        debug!(table = %name, schema = %schema, columns = columns.len(), "loaded table columns");

        if !columns.is_empty() {
            self.columns.borrow_mut().insert(name, columns.clone());
        }
        Ok(columns)
    }

    pub fn is_cached(&self, table: &str) -> bool {
        self.columns.borrow().contains_key(table)
    }
}
