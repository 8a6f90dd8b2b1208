//! Identifier quoting, table references and column lists.
//!
//! Identifiers are wrapped in backticks. Only names made of ASCII letters,
//! digits and underscores (optionally `schema.table` dotted) are quoted;
//! function calls and anything else pass through untouched, so callers can
//! still write expressions where an identifier is expected.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SqlError};
use crate::statement::Statement;

static IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex must compile"));
static DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+|\*)$").expect("static regex must compile"));
static FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+)\s*\((.*)\)$").expect("static regex must compile"));
static QUALIFIED_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:`?([A-Za-z0-9_]+)`?\.)?`?([A-Za-z0-9_]+)`?(?:\s+as\s+`?[A-Za-z0-9_]+`?)?$",
    )
    .expect("static regex must compile")
});

/// Returns `true` for a plain `[A-Za-z0-9_]+` name.
pub fn is_identifier(name: &str) -> bool {
    IDENT.is_match(name)
}

/// Wraps a name in backticks, doubling embedded backticks.
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quotes a column reference: `name`, `table.name` or `table.*`.
///
/// `*` and anything that is not a plain or dotted identifier is returned
/// unchanged.
pub fn column(name: &str) -> String {
    if IDENT.is_match(name) {
        return quote(name);
    }
    if let Some(caps) = DOTTED.captures(name) {
        let field = &caps[2];
        let field = if field == "*" { "*".to_string() } else { quote(field) };
        return format!("{}.{field}", quote(&caps[1]));
    }
    name.to_string()
}

/// Renders a where-tree key: a column reference or a function call such as
/// `count(id)`, whose name is upper-cased and whose plain argument is quoted.
pub(crate) fn expression(key: &str) -> String {
    if IDENT.is_match(key) || DOTTED.is_match(key) {
        return column(key);
    }
    if let Some(caps) = FUNCTION.captures(key) {
        let function = caps[1].to_uppercase();
        let argument = caps[2].trim();
        return format!("{function}({})", column(argument));
    }
    key.to_string()
}

/// Renders a table name: `users` → `` `users` ``, `main.users` →
/// `` `main`.`users` ``; function calls and other text pass through.
pub fn table_name(name: &str) -> String {
    if IDENT.is_match(name) {
        return quote(name);
    }
    if let Some(caps) = DOTTED.captures(name) {
        if &caps[2] != "*" {
            return format!("{}.{}", quote(&caps[1]), quote(&caps[2]));
        }
    }
    if let Some(caps) = FUNCTION.captures(name) {
        return format!("{}({})", &caps[1], &caps[2]);
    }
    name.to_string()
}

/// Splits rendered table text back into `(schema, table)`.
///
/// Accepts `` `t` ``, `` `s`.`t` ``, `s.t` and `t`, each optionally followed
/// by `AS alias`. Returns `None` when the text is not a plain table reference.
pub fn schema_and_table(text: &str) -> Option<(Option<String>, String)> {
    let caps = QUALIFIED_TABLE.captures(text.trim())?;
    let schema = caps.get(1).map(|m| m.as_str().to_string());
    Some((schema, caps[2].to_string()))
}

/// A table reference for `FROM`, `INSERT INTO`, `UPDATE` and `DELETE FROM`.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Name { name: String, alias: Option<String> },
    Sql { statement: Statement, alias: Option<String> },
}

impl TableRef {
    pub fn aliased(self, alias: impl Into<String>) -> Self {
        let alias = Some(alias.into());
        match self {
            TableRef::Name { name, .. } => TableRef::Name { name, alias },
            TableRef::Sql { statement, .. } => TableRef::Sql { statement, alias },
        }
    }

    /// Renders the reference, appending `` AS `alias` `` when set.
    pub fn to_statement(&self) -> Statement {
        let (mut stmt, alias) = match self {
            TableRef::Name { name, alias } => (Statement::raw(table_name(name)), alias),
            TableRef::Sql { statement, alias } => (statement.clone(), alias),
        };
        if let Some(alias) = alias {
            stmt.push_sql(&format!(" AS {}", quote(alias)));
        }
        stmt
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::Name {
            name: name.to_string(),
            alias: None,
        }
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        TableRef::Name { name, alias: None }
    }
}

impl From<(&str, &str)> for TableRef {
    fn from((name, alias): (&str, &str)) -> Self {
        TableRef::from(name).aliased(alias)
    }
}

impl From<Statement> for TableRef {
    fn from(statement: Statement) -> Self {
        TableRef::Sql {
            statement,
            alias: None,
        }
    }
}

/// Builds a table reference with an optional alias.
pub fn table(name: impl Into<TableRef>, alias: Option<&str>) -> Statement {
    let table = name.into();
    match alias {
        Some(alias) => table.aliased(alias).to_statement(),
        None => table.to_statement(),
    }
}

/// The column list of a `SELECT` or `GROUP BY`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Columns {
    /// `*`
    #[default]
    All,
    /// Each name quoted and comma-joined.
    Names(Vec<String>),
    /// `(alias, expression)` pairs; unaliased entries are plain columns and
    /// function-call expressions are kept raw.
    Aliased(Vec<(Option<String>, String)>),
    /// Used verbatim.
    Sql(Statement),
}

impl Columns {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Columns::Names(names.into_iter().map(Into::into).collect())
    }

    /// `true` for an empty name list or empty raw SQL; `*` is not empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Columns::All => false,
            Columns::Names(names) => names.is_empty(),
            Columns::Aliased(pairs) => pairs.is_empty(),
            Columns::Sql(stmt) => stmt.is_empty(),
        }
    }

    pub fn to_statement(&self) -> Statement {
        match self {
            Columns::All => Statement::raw("*"),
            Columns::Names(names) if names.is_empty() => Statement::raw("*"),
            Columns::Names(names) => {
                let cols: Vec<String> = names.iter().map(|n| column(n)).collect();
                Statement::raw(cols.join(", "))
            }
            Columns::Aliased(pairs) if pairs.is_empty() => Statement::raw("*"),
            Columns::Aliased(pairs) => {
                let cols: Vec<String> = pairs
                    .iter()
                    .map(|(alias, expr)| match alias {
                        None => column(expr),
                        Some(alias) => {
                            let expr = if expr.contains('(') { expr.clone() } else { column(expr) };
                            format!("{expr} AS {}", quote(alias))
                        }
                    })
                    .collect();
                Statement::raw(cols.join(", "))
            }
            Columns::Sql(stmt) => stmt.clone(),
        }
    }

    /// Parses a JSON column spec: a raw string, an array of names, or an
    /// object of `alias → expression` (digit-only keys mean no alias).
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::String(raw) => Ok(Columns::Sql(Statement::raw(raw.clone()))),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(String::from)
                        .ok_or_else(|| SqlError::input("columns", format!("expected a column name, got {item}")))
                })
                .collect::<Result<Vec<_>>>()
                .map(Columns::Names),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(key, expr)| {
                    let expr = expr
                        .as_str()
                        .ok_or_else(|| SqlError::input("columns", format!("expected an expression for '{key}'")))?;
                    let alias = (!is_index_key(key)).then(|| key.clone());
                    Ok((alias, expr.to_string()))
                })
                .collect::<Result<Vec<_>>>()
                .map(Columns::Aliased),
            other => Err(SqlError::input("columns", format!("unsupported value {other}"))),
        }
    }
}

impl From<&str> for Columns {
    fn from(name: &str) -> Self {
        Columns::Names(vec![name.to_string()])
    }
}

impl<S: Into<String>> From<Vec<S>> for Columns {
    fn from(names: Vec<S>) -> Self {
        Columns::names(names)
    }
}

impl From<Statement> for Columns {
    fn from(stmt: Statement) -> Self {
        Columns::Sql(stmt)
    }
}

/// Object keys made only of digits stand for positional (integer) keys.
pub(crate) fn is_index_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}
