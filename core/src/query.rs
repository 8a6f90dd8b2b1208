//! Statement assembly for `SELECT`, `INSERT`, `UPDATE` and `DELETE`.
//!
//! The functions here are pure: they take the column list of the target
//! table as an argument instead of looking it up, so they can be used with
//! any catalog (see `quarry_sqlite::SchemaCatalog`).

use crate::condition::Condition;
use crate::error::{Result, SqlError};
use crate::ident::{Columns, TableRef, quote};
use crate::order::{Joins, Order};
use crate::result::Row;
use crate::statement::Statement;
use crate::value::Value;

/// Options of a `SELECT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    columns: Columns,
    joins: Joins,
    filter: Option<Condition>,
    group: Option<Columns>,
    having: Option<Condition>,
    order: Order,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: impl Into<Columns>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn join(mut self, key: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.joins = self.joins.add(key, condition);
        self
    }

    pub fn joins(mut self, joins: Joins) -> Self {
        self.joins = joins;
        self
    }

    pub fn filter(mut self, condition: impl Into<Condition>) -> Self {
        self.filter = Some(condition.into());
        self
    }

    pub fn group_by(mut self, columns: impl Into<Columns>) -> Self {
        self.group = Some(columns.into());
        self
    }

    pub fn having(mut self, condition: impl Into<Condition>) -> Self {
        self.having = Some(condition.into());
        self
    }

    pub fn order(mut self, order: impl Into<Order>) -> Self {
        self.order = order.into();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The same query with limit and offset removed.
    pub fn without_paging(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    /// Parses JSON select options.
    ///
    /// Recognized keys and their synonyms: `columns|column|col|cols|select`,
    /// `where`, `order|orderby|sort|sortby`, `limit|take`, `offset|skip`,
    /// `join|joins`, `group|groupby` and `having`. The first synonym present
    /// wins; unknown keys are ignored. A limit or offset of `0` counts as
    /// unset.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(SqlError::input("query", format!("expected an object, got {json}")));
        };
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| map.get(*key))
                .filter(|value| !value.is_null())
        };

        let mut query = Query::new();
        if let Some(columns) = pick(&["columns", "column", "col", "cols", "select"]) {
            query.columns = Columns::from_json(columns)?;
        }
        if let Some(filter) = pick(&["where"]) {
            query.filter = Some(Condition::from_json(filter)?);
        }
        if let Some(order) = pick(&["order", "orderby", "sort", "sortby"]) {
            query.order = Order::from_json(order)?;
        }
        if let Some(limit) = pick(&["limit", "take"]) {
            query.limit = paging(limit, "limit")?;
        }
        if let Some(offset) = pick(&["offset", "skip"]) {
            query.offset = paging(offset, "offset")?;
        }
        if let Some(joins) = pick(&["join", "joins"]) {
            query.joins = Joins::from_json(joins)?;
        }
        if let Some(group) = pick(&["group", "groupby"]) {
            query.group = Some(Columns::from_json(group)?);
        }
        if let Some(having) = pick(&["having"]) {
            query.having = Some(Condition::from_json(having)?);
        }
        Ok(query)
    }
}

fn paging(value: &serde_json::Value, context: &'static str) -> Result<Option<u64>> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| SqlError::input(context, format!("expected a number, got {value}")))?;
    Ok((n > 0).then_some(n as u64))
}

/// An ordered write payload: column name to value.
///
/// Lists are stored as JSON text (an empty list as `NULL`) when the payload
/// is turned into a statement, so one column can hold a whole array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a field, replacing an earlier value for the same column in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keeps only fields naming one of `columns`, in payload order.
    pub fn only(&self, columns: &[String]) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .filter(|(c, _)| columns.iter().any(|known| known == c))
                .cloned()
                .collect(),
        }
    }

    /// Drops the fields naming one of `columns`.
    pub fn without(&self, columns: &[&str]) -> Record {
        Record {
            fields: self
                .fields
                .iter()
                .filter(|(c, _)| !columns.contains(&c.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Parses a JSON object. Arrays and objects become JSON text, empty ones `NULL`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(SqlError::input("record", format!("expected an object, got {json}")));
        };
        let fields = map
            .iter()
            .map(|(column, value)| {
                let value = match value {
                    serde_json::Value::Array(items) if items.is_empty() => Value::Null,
                    serde_json::Value::Object(map) if map.is_empty() => Value::Null,
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Text(value.to_string()),
                    scalar => Value::from(scalar),
                };
                (column.clone(), value)
            })
            .collect();
        Ok(Record { fields })
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.set(column, value);
        }
        record
    }
}

impl From<Row<'_>> for Record {
    fn from(row: Row<'_>) -> Self {
        row.columns().iter().cloned().zip(row.values().iter().cloned()).collect()
    }
}

fn payload_value(value: &Value) -> Value {
    match value {
        Value::List(items) if items.is_empty() => Value::Null,
        Value::List(_) => Value::Text(value.to_json().to_string()),
        other => other.clone(),
    }
}

/// Builds `SELECT <columns> FROM <table> <joins> WHERE … GROUP BY … HAVING …
/// ORDER BY … LIMIT … OFFSET …`, omitting every empty clause.
pub fn select(table: impl Into<TableRef>, query: &Query) -> Result<Statement> {
    let mut stmt = Statement::raw("SELECT ");
    stmt.push_statement(&query.columns.to_statement());
    stmt.push_sql(" FROM ");
    stmt.push_statement(&table.into().to_statement());

    if let Some(joins) = query.joins.compile()? {
        stmt.push_sql(" ");
        stmt.push_statement(&joins);
    }
    if let Some(filter) = compile_condition(query.filter.as_ref())? {
        stmt.push_sql(" WHERE ");
        stmt.push_statement(&filter);
    }
    if let Some(group) = query.group.as_ref().filter(|group| !group.is_empty()) {
        stmt.push_sql(" GROUP BY ");
        stmt.push_statement(&group.to_statement());
    }
    if let Some(having) = compile_condition(query.having.as_ref())? {
        stmt.push_sql(" HAVING ");
        stmt.push_statement(&having);
    }
    if let Some(order) = query.order.compile() {
        stmt.push_sql(" ORDER BY ");
        stmt.push_statement(&order);
    }
    match (query.limit, query.offset) {
        (Some(limit), _) => {
            stmt.push_sql(" LIMIT ");
            stmt.push_value(Value::Int(clamp(limit)));
        }
        (None, Some(_)) => stmt.push_sql(" LIMIT -1"),
        (None, None) => {}
    }
    if let Some(offset) = query.offset {
        stmt.push_sql(" OFFSET ");
        stmt.push_value(Value::Int(clamp(offset)));
    }
    Ok(stmt)
}

/// `SELECT COUNT(*) FROM (<select without limit/offset>) AS count_table`.
pub fn count(table: impl Into<TableRef>, query: &Query) -> Result<Statement> {
    let inner = select(table, &query.without_paging())?;
    let mut stmt = Statement::raw("SELECT COUNT(*) FROM (");
    stmt.push_statement(&inner);
    stmt.push_sql(") AS count_table");
    Ok(stmt)
}

/// `INSERT INTO <table> (…) VALUES (…)` for the fields of `record` that name
/// one of `columns`. With nothing left, inserts a row of defaults.
pub fn insert(table: impl Into<TableRef>, record: &Record, columns: &[String]) -> Result<Statement> {
    let table = table.into().to_statement();
    let record = record.only(columns);

    let mut stmt = Statement::raw("INSERT INTO ");
    stmt.push_statement(&table);
    if record.is_empty() {
        stmt.push_sql(" DEFAULT VALUES");
        return Ok(stmt);
    }

    let names: Vec<String> = record.keys().map(quote).collect();
    stmt.push_sql(&format!(" ({}) VALUES (", names.join(", ")));
    for (i, (_, value)) in record.fields.iter().enumerate() {
        if i > 0 {
            stmt.push_sql(", ");
        }
        stmt.push_value(payload_value(value));
    }
    stmt.push_sql(")");
    Ok(stmt)
}

/// Multi-row insert. The column set is taken from the first row (filtered by
/// `columns`); cells missing from later rows are written as `NULL`.
pub fn insert_many(table: impl Into<TableRef>, rows: &[Record], columns: &[String]) -> Result<Statement> {
    let table = table.into().to_statement();
    let Some(first) = rows.first() else {
        return Err(SqlError::EmptyPayload(table.to_string()));
    };
    let keys: Vec<String> = first.only(columns).keys().map(String::from).collect();
    if keys.is_empty() {
        return Err(SqlError::EmptyPayload(table.to_string()));
    }

    let names: Vec<String> = keys.iter().map(|k| quote(k)).collect();
    let mut stmt = Statement::raw("INSERT INTO ");
    stmt.push_statement(&table);
    stmt.push_sql(&format!(" ({}) VALUES ", names.join(", ")));
    for (r, row) in rows.iter().enumerate() {
        stmt.push_sql(if r > 0 { ", (" } else { "(" });
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                stmt.push_sql(", ");
            }
            stmt.push_value(row.get(key).map(payload_value).unwrap_or(Value::Null));
        }
        stmt.push_sql(")");
    }
    Ok(stmt)
}

/// `UPDATE <table> SET … WHERE …`.
///
/// # Errors
///
/// [`SqlError::EmptyPayload`] when no field of `record` names a known column,
/// [`SqlError::EmptyCondition`] when `condition` compiles to nothing.
pub fn update(
    table: impl Into<TableRef>,
    record: &Record,
    columns: &[String],
    condition: impl Into<Condition>,
) -> Result<Statement> {
    let table = table.into().to_statement();
    let record = record.only(columns);
    if record.is_empty() {
        return Err(SqlError::EmptyPayload(table.to_string()));
    }

    let mut stmt = Statement::raw("UPDATE ");
    stmt.push_statement(&table);
    stmt.push_sql(" SET ");
    for (i, (column, value)) in record.fields.iter().enumerate() {
        if i > 0 {
            stmt.push_sql(", ");
        }
        stmt.push_sql(&format!("{} = ", quote(column)));
        stmt.push_value(payload_value(value));
    }
    require_where(&mut stmt, &condition.into(), &table)?;
    Ok(stmt)
}

/// `DELETE FROM <table> WHERE …`. Pass `"1"` to delete every row.
///
/// # Errors
///
/// [`SqlError::EmptyCondition`] when `condition` compiles to nothing.
pub fn delete(table: impl Into<TableRef>, condition: impl Into<Condition>) -> Result<Statement> {
    let table = table.into().to_statement();
    let mut stmt = Statement::raw("DELETE FROM ");
    stmt.push_statement(&table);
    require_where(&mut stmt, &condition.into(), &table)?;
    Ok(stmt)
}

/// Appends ` WHERE <condition>`; an empty condition is an error.
fn require_where(stmt: &mut Statement, condition: &Condition, table: &Statement) -> Result<()> {
    let Some(cond) = condition.compile()? else {
        return Err(SqlError::EmptyCondition(table.to_string()));
    };
    stmt.push_sql(" WHERE ");
    stmt.push_statement(&cond);
    Ok(())
}

fn compile_condition(condition: Option<&Condition>) -> Result<Option<Statement>> {
    condition.map_or(Ok(None), Condition::compile)
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::condition::Where;
    use crate::result::ResultSet;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_select_defaults() {
        let stmt = select("users", &Query::new()).unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM `users`");
    }

    #[test]
    fn test_select_with_every_clause() {
        let query = Query::new()
            .columns(vec!["u.id", "u.name"])
            .join("LEFT JOIN `posts` AS `p`", "`p`.`user_id` = `u`.`id`")
            .filter(Where::new().eq("u.active", true))
            .group_by(vec!["u.id"])
            .having(Where::new().op("count(p.id)", "gt", 1))
            .order(Order::new().desc("u.name"))
            .limit(10)
            .offset(20);
        let stmt = select(("users", "u"), &query).unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT `u`.`id`, `u`.`name` FROM `users` AS `u` LEFT JOIN `posts` AS `p` ON `p`.`user_id` = `u`.`id` \
             WHERE `u`.`active` = 1 GROUP BY `u`.`id` HAVING COUNT(`p`.`id`) > 1 ORDER BY `u`.`name` DESC \
             LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let stmt = select("t", &Query::new().offset(5)).unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM `t` LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_query_from_json_synonyms() {
        let query = Query::from_json(&json!({
            "cols": ["id"],
            "where": {"name": "ada"},
            "sortby": {"id": "desc"},
            "take": 3,
            "skip": 0
        }))
        .unwrap();
        let stmt = select("users", &query).unwrap();
        assert_eq!(stmt.sql(), "SELECT `id` FROM `users` WHERE `name` = :p__0 ORDER BY `id` DESC LIMIT 3");
        assert!(Query::from_json(&json!([1])).is_err());
        assert!(Query::from_json(&json!({"limit": "many"})).is_err());
    }

    #[test]
    fn test_count_wraps_select_without_paging() {
        let query = Query::new().filter(Where::new().op("age", "gte", 18)).limit(10).offset(3);
        let stmt = count("users", &query).unwrap();
        assert_eq!(
            stmt.sql(),
            "SELECT COUNT(*) FROM (SELECT * FROM `users` WHERE `age` >= 18) AS count_table"
        );
    }

    #[test]
    fn test_insert_filters_unknown_columns() {
        let record = Record::new().with("name", "ada").with("bogus", 1).with("age", 36);
        let stmt = insert("users", &record, &cols(&["id", "name", "age"])).unwrap();
        assert_eq!(stmt.sql(), "INSERT INTO `users` (`name`, `age`) VALUES (:p__0, 36)");
        assert_eq!(stmt.to_string(), "INSERT INTO `users` (`name`, `age`) VALUES ('ada', 36)");
    }

    #[test]
    fn test_insert_with_nothing_known_uses_defaults() {
        let record = Record::new().with("bogus", 1);
        let stmt = insert("users", &record, &cols(&["id"])).unwrap();
        assert_eq!(stmt.sql(), "INSERT INTO `users` DEFAULT VALUES");
    }

    #[test]
    fn test_list_fields_are_json_encoded() {
        let record = Record::from_json(&json!({"tags": ["a", "b"], "meta": [], "id": 1})).unwrap();
        let stmt = insert("posts", &record, &cols(&["id", "tags", "meta"])).unwrap();
        assert_eq!(stmt.to_string(), "INSERT INTO `posts` (`tags`, `meta`, `id`) VALUES ('[\"a\",\"b\"]', NULL, 1)");

        let record = Record::new().with("tags", Value::List(vec![Value::Int(1)]));
        let stmt = insert("posts", &record, &cols(&["tags"])).unwrap();
        assert_eq!(stmt.to_string(), "INSERT INTO `posts` (`tags`) VALUES ('[1]')");
    }

    #[test]
    fn test_insert_many_fills_missing_cells() {
        let rows = vec![
            Record::new().with("name", "a").with("age", 1),
            Record::new().with("name", "b"),
        ];
        let stmt = insert_many("users", &rows, &cols(&["name", "age"])).unwrap();
        assert_eq!(stmt.to_string(), "INSERT INTO `users` (`name`, `age`) VALUES ('a', 1), ('b', NULL)");
        assert!(matches!(insert_many("users", &[], &cols(&["name"])), Err(SqlError::EmptyPayload(_))));
    }

    #[test]
    fn test_update_requires_payload() {
        let record = Record::new().with("name", "x").with("nope", 1);
        let stmt = update("users", &record, &cols(&["name"]), Where::new().eq("id", 7)).unwrap();
        assert_eq!(stmt.sql(), "UPDATE `users` SET `name` = :p__0 WHERE `id` = 7");

        let err = update("users", &Record::new().with("nope", 1), &cols(&["name"]), "1").unwrap_err();
        assert_eq!(err, SqlError::EmptyPayload("`users`".into()));
    }

    #[test]
    fn test_delete() {
        assert_eq!(delete("users", "1").unwrap().sql(), "DELETE FROM `users` WHERE 1");
        let stmt = delete("main.users", Where::new().eq("id", vec![1, 2])).unwrap();
        assert_eq!(stmt.sql(), "DELETE FROM `main`.`users` WHERE `id` IN (1, 2)");
    }

    #[test]
    fn test_empty_condition_is_rejected_for_writes() {
        let empty = SqlError::EmptyCondition("`users`".into());
        assert_eq!(delete("users", Where::new()).unwrap_err(), empty);
        assert_eq!(delete("users", "").unwrap_err(), empty);
        let from_json = Condition::from_json(&json!({})).unwrap();
        assert_eq!(delete("users", from_json).unwrap_err(), empty);
        let nested = Where::new().group(Where::new());
        assert_eq!(delete("users", nested).unwrap_err(), empty);

        let record = Record::new().with("name", "x");
        let err = update("users", &record, &cols(&["name"]), Where::new()).unwrap_err();
        assert_eq!(err, empty);
        let stmt = update("users", &record, &cols(&["name"]), "1").unwrap();
        assert_eq!(stmt.to_string(), "UPDATE `users` SET `name` = 'x' WHERE 1");
    }

    #[test]
    fn test_record_from_row_and_without() {
        let rs = ResultSet {
            columns: cols(&["id", "name", "secret"]),
            rows: vec![vec![Value::Int(1), Value::Text("ada".into()), Value::Text("x".into())]],
            ..ResultSet::default()
        };
        let record = Record::from(rs.first().unwrap());
        assert_eq!(record.keys().collect::<Vec<_>>(), ["id", "name", "secret"]);
        let public = record.without(&["secret", "missing"]);
        assert_eq!(public.keys().collect::<Vec<_>>(), ["id", "name"]);
        assert_eq!(public.get("name"), Some(&Value::Text("ada".into())));
    }

    #[test]
    fn test_record_set_replaces_in_place() {
        let mut record: Record = [("a", 1), ("b", 2)].into_iter().collect();
        record.set("a", 3);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::Int(3)));
    }
}
