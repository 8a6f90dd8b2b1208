//! Conversion between [`quarry_core::Value`] and SQLite values.
//!
//! Booleans are stored as integers and lists as JSON text; SQLite has no
//! native type for either.

use quarry_core::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Converts a statement argument into an owned SQLite value for binding.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) if f.is_finite() => SqlValue::Real(*f),
        Value::Float(_) => SqlValue::Null,
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        Value::List(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

/// Converts a borrowed result cell into a [`Value`].
pub(crate) fn from_sql(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql() {
        assert_eq!(to_sql(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&Value::Float(f64::INFINITY)), SqlValue::Null);
        assert_eq!(
            to_sql(&Value::List(vec![Value::Int(1), Value::Text("a".into())])),
            SqlValue::Text("[1,\"a\"]".into())
        );
    }

    #[test]
    fn test_from_sql() {
        assert_eq!(from_sql(ValueRef::Integer(3)), Value::Int(3));
        assert_eq!(from_sql(ValueRef::Text(b"hi")), Value::Text("hi".into()));
        assert_eq!(from_sql(ValueRef::Blob(&[1, 2])), Value::Blob(vec![1, 2]));
        assert_eq!(from_sql(ValueRef::Null), Value::Null);
    }
}
