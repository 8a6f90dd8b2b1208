//! Typed parameter values and the encoder that turns them into SQL text.
//!
//! Every positional argument of a [`Statement`] is encoded in one of three
//! ways, described by [`Encoded`]:
//!
//! - **literal**: nulls, booleans, numbers and lists have no escaping
//!   ambiguity and are written straight into the SQL text;
//! - **bound**: strings and blobs become a named placeholder and travel to
//!   the driver as bound parameters;
//! - **inline**: a nested [`Statement`] is spliced in verbatim and its own
//!   arguments are merged into the outer statement.

use std::fmt;

use crate::statement::Statement;

/// A scalar or list value usable as a statement argument or a row cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Expanded into a parenthesized literal list, as used by `IN`.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value into its JSON representation.
    ///
    /// Used when list-valued fields are written to a single column.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
            }
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(_) => Value::Text(json.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&literal(self))
    }
}

/// A positional argument handed to [`Statement::build`].
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(Value),
    /// A nested statement, inlined as raw SQL rather than bound.
    Sql(Statement),
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<Statement> for Param {
    fn from(s: Statement) -> Self {
        Param::Sql(s)
    }
}

impl From<&Statement> for Param {
    fn from(s: &Statement) -> Self {
        Param::Sql(s.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        Param::Value(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Param {
    fn from(items: Vec<T>) -> Self {
        Param::Value(Value::List(items.into_iter().map(Into::into).collect()))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Param {
    fn from(items: [T; N]) -> Self {
        Param::Value(items.into())
    }
}

impl From<&serde_json::Value> for Param {
    fn from(json: &serde_json::Value) -> Self {
        Param::Value(json.into())
    }
}

macro_rules! param_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::Value(Value::from(v))
                }
            }
        )*
    };
}

param_from_scalar!(bool, i32, i64, u32, f64, &str, String, &String);

/// Builds a `Vec<Param>` from heterogeneous arguments.
///
/// ```
/// use quarry_core::{Statement, args};
///
/// let stmt = Statement::build("SELECT * FROM `users` WHERE `name` = ? AND `age` > ?", args!["ada", 30]).unwrap();
/// assert_eq!(stmt.sql(), "SELECT * FROM `users` WHERE `name` = :p__0 AND `age` > 30");
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Param>::new() };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Param::from($arg)),+]
    };
}

/// How a single argument is rendered into the driver-facing SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded<'a> {
    /// Written into the SQL text as-is.
    Literal(String),
    /// Sent to the driver under a named placeholder.
    Bound(&'a Value),
    /// Spliced in verbatim; its arguments merge into the outer statement.
    Inline(&'a Statement),
}

/// Encodes an argument.
pub fn encode(param: &Param) -> Encoded<'_> {
    match param {
        Param::Sql(statement) => Encoded::Inline(statement),
        Param::Value(value) => encode_value(value),
    }
}

pub(crate) fn encode_value(value: &Value) -> Encoded<'_> {
    match value {
        Value::Text(_) | Value::Blob(_) => Encoded::Bound(value),
        other => Encoded::Literal(literal(other)),
    }
}

/// Renders a value as a self-contained SQL literal.
///
/// Strings are single-quoted with embedded quotes doubled; this form is used
/// inside `IN` lists and for the diagnostic rendering of a statement.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) => "NULL".to_string(),
        Value::Text(s) => quote_string(s),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(literal).collect();
            format!("({})", inner.join(", "))
        }
    }
}

/// Single-quotes a string for SQL, doubling embedded quotes.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
