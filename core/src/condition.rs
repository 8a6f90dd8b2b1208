//! Where-trees: structured `WHERE` / `HAVING` / `ON` conditions.
//!
//! A [`Where`] is an ordered list of entries compiled left to right:
//!
//! - positional entries: a raw SQL fragment (parenthesized when it has
//!   siblings), or a nested tree rendered in parentheses;
//! - keyed entries: a column or function expression compared with `=`, or an
//!   operator map such as `{gte: 18, lte: 65}`.
//!
//! Siblings are joined with `AND`. A key may start with `and `, `or ` or
//! `not ` to change the combinator linking it to the *previous* sibling, so a
//! prefix on the first entry has no visible effect. `not` links as `AND NOT`.
//!
//! ```
//! use quarry_core::Where;
//!
//! let tree = Where::new()
//!     .ops("age", [("gte", 18), ("lte", 65)])
//!     .eq("or role", "admin");
//! let stmt = tree.compile().unwrap().unwrap();
//! assert_eq!(stmt.template(), "(`age` >= ? AND `age` <= ?) OR `role` = ?");
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SqlError};
use crate::ident::{expression, is_index_key};
use crate::statement::Statement;
use crate::value::{Param, Value};

static COMBINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(and|or|not)\s+").expect("static regex must compile"));

/// Operators accepted after alias mapping.
const OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", "<=", ">", ">=", "IS", "IS NOT", "IN", "NOT IN", "BETWEEN", "NOT BETWEEN", "LIKE",
    "NOT LIKE", "GLOB", "NOT GLOB", "REGEXP", "NOT REGEXP", "MATCH", "NOT MATCH",
];

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Fragment(Statement),
    Group(Where),
    Equals { key: String, value: Param },
    Ops { key: String, ops: Vec<(String, Param)> },
}

/// An ordered where-tree. An empty tree compiles to no clause at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    entries: Vec<Entry>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `key = value`; a `null` value compiles to `IS NULL` and a list to `IN`.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.entries.push(Entry::Equals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// A single-operator entry, e.g. `op("age", "gte", 18)`.
    pub fn op(self, key: impl Into<String>, operator: impl Into<String>, value: impl Into<Param>) -> Self {
        self.ops(key, [(operator.into(), value.into())])
    }

    /// An operator map applied to one key, e.g. `ops("age", [("gte", 18), ("lte", 65)])`.
    ///
    /// Operator names may carry their own `and|or|not` prefix, which links
    /// them to the previous operator of the same key.
    pub fn ops<I, O, V>(mut self, key: impl Into<String>, ops: I) -> Self
    where
        I: IntoIterator<Item = (O, V)>,
        O: Into<String>,
        V: Into<Param>,
    {
        self.entries.push(Entry::Ops {
            key: key.into(),
            ops: ops.into_iter().map(|(o, v)| (o.into(), v.into())).collect(),
        });
        self
    }

    /// A raw SQL fragment, ANDed with its siblings. Among siblings it is
    /// wrapped in parentheses so an `OR` inside cannot bind across them.
    pub fn raw(mut self, fragment: impl Into<Statement>) -> Self {
        self.entries.push(Entry::Fragment(fragment.into()));
        self
    }

    /// A nested tree, rendered in parentheses.
    pub fn group(mut self, tree: Where) -> Self {
        self.entries.push(Entry::Group(tree));
        self
    }

    /// Compiles the tree. Returns `Ok(None)` when nothing is left to render.
    pub fn compile(&self) -> Result<Option<Statement>> {
        let mut out = Statement::raw("");
        let mut rendered = 0usize;
        let parenthesize_ops = self.entries.len() > 1;

        for entry in &self.entries {
            let (combinator, cond) = match entry {
                Entry::Fragment(stmt) if stmt.is_empty() => ("AND", None),
                Entry::Fragment(stmt) if parenthesize_ops => ("AND", Some(parenthesized(stmt))),
                Entry::Fragment(stmt) => ("AND", Some(stmt.clone())),
                Entry::Group(tree) => ("AND", tree.compile()?.map(|inner| parenthesized(&inner))),
                Entry::Equals { key, value } => {
                    let (combinator, key) = split_combinator(key);
                    (combinator, Some(compile_equals(key, value)?))
                }
                Entry::Ops { key, ops } => {
                    let (combinator, key) = split_combinator(key);
                    (combinator, compile_ops(key, ops, parenthesize_ops)?)
                }
            };

            let Some(cond) = cond else { continue };
            if rendered > 0 {
                out.push_sql(&format!(" {combinator} "));
            }
            out.push_statement(&cond);
            rendered += 1;
        }

        Ok((rendered > 0).then_some(out))
    }

    /// Parses a JSON where-tree.
    ///
    /// Objects map column keys to values or operator objects; digit-only keys
    /// and array elements are positional (a string is a raw fragment, an
    /// object or array a nested group). A bare string is a raw fragment and
    /// `null` an empty tree.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut tree = Where::new();
        match json {
            serde_json::Value::Null => {}
            serde_json::Value::String(raw) => tree = tree.raw(raw.as_str()),
            serde_json::Value::Array(items) => {
                for item in items {
                    tree = tree.positional(item)?;
                }
            }
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    if is_index_key(key) {
                        tree = tree.positional(value)?;
                        continue;
                    }
                    tree = match value {
                        serde_json::Value::Object(ops) => tree.ops(
                            key.as_str(),
                            ops.iter()
                                .filter(|(op, _)| !is_index_key(op))
                                .map(|(op, v)| (op.as_str(), Param::from(v))),
                        ),
                        other => tree.eq(key.as_str(), Param::from(other)),
                    };
                }
            }
            other => return Err(SqlError::input("where-tree", format!("unsupported value {other}"))),
        }
        Ok(tree)
    }

    fn positional(self, item: &serde_json::Value) -> Result<Self> {
        Ok(match item {
            serde_json::Value::String(raw) => self.raw(raw.as_str()),
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => self.group(Where::from_json(item)?),
            _ => self,
        })
    }
}

/// A condition argument: a where-tree or raw SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Tree(Where),
    Sql(Statement),
}

impl Condition {
    pub fn compile(&self) -> Result<Option<Statement>> {
        match self {
            Condition::Tree(tree) => tree.compile(),
            Condition::Sql(stmt) if stmt.is_empty() => Ok(None),
            Condition::Sql(stmt) => Ok(Some(stmt.clone())),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Where::from_json(json).map(Condition::Tree)
    }
}

impl From<Where> for Condition {
    fn from(tree: Where) -> Self {
        Condition::Tree(tree)
    }
}

impl From<Statement> for Condition {
    fn from(stmt: Statement) -> Self {
        Condition::Sql(stmt)
    }
}

impl From<&str> for Condition {
    fn from(sql: &str) -> Self {
        Condition::Sql(Statement::raw(sql))
    }
}

impl From<String> for Condition {
    fn from(sql: String) -> Self {
        Condition::Sql(Statement::raw(sql))
    }
}

fn split_combinator(key: &str) -> (&'static str, &str) {
    let Some(caps) = COMBINATOR.captures(key) else {
        return ("AND", key);
    };
    let combinator = match caps[1].to_ascii_lowercase().as_str() {
        "or" => "OR",
        "not" => "AND NOT",
        _ => "AND",
    };
    (combinator, &key[caps[0].len()..])
}

/// `not in`, `not like` and friends are operators, not `not`-linked ones.
fn is_negated_operator(raw: &str) -> bool {
    let upper = raw.trim().replace('_', " ").to_uppercase();
    let mut words = upper.split_whitespace();
    words.next() == Some("NOT")
        && matches!(words.next(), Some("IN" | "BETWEEN" | "LIKE" | "GLOB" | "REGEXP" | "MATCH"))
        && words.next().is_none()
}

/// Maps operator aliases onto SQL operators.
fn normalize_operator(raw: &str) -> Result<String> {
    let upper = raw.trim().replace('_', " ").to_uppercase();
    let upper = upper.split_whitespace().collect::<Vec<_>>().join(" ");
    let op = match upper.as_str() {
        "GT" => ">",
        "GTE" => ">=",
        "LT" => "<",
        "LTE" => "<=",
        "E" | "EQ" | "EQUAL" | "EQUALS" => "=",
        "NE" | "NEQ" => "!=",
        "NIN" => "NOT IN",
        other => other,
    };
    match OPERATORS.iter().find(|known| **known == op) {
        Some(known) => Ok(known.to_string()),
        None => Err(SqlError::InvalidOperator(raw.to_string())),
    }
}

fn parenthesized(inner: &Statement) -> Statement {
    let mut out = Statement::raw("(");
    out.push_statement(inner);
    out.push_sql(")");
    out
}

fn compile_equals(key: &str, value: &Param) -> Result<Statement> {
    let column = expression(key);
    match value {
        Param::Value(Value::Null) => Ok(Statement::raw(format!("{column} IS NULL"))),
        Param::Value(Value::List(_)) => Statement::build(&format!("{column} IN ?"), vec![value.clone()]),
        Param::Sql(_) => Statement::build(&format!("{column} = (?)"), vec![value.clone()]),
        Param::Value(_) => Statement::build(&format!("{column} = ?"), vec![value.clone()]),
    }
}

fn compile_ops(key: &str, ops: &[(String, Param)], parenthesize: bool) -> Result<Option<Statement>> {
    let column = expression(key);
    let mut out = Statement::raw("");
    let mut rendered = 0usize;

    for (operator, value) in ops {
        let (combinator, operator) = if rendered > 0 && !is_negated_operator(operator) {
            split_combinator(operator)
        } else {
            ("AND", operator.as_str())
        };
        let operator = normalize_operator(operator)?;
        let cond = compile_op(key, &column, &operator, value)?;
        if rendered > 0 {
            out.push_sql(&format!(" {combinator} "));
        }
        out.push_statement(&cond);
        rendered += 1;
    }

    Ok(match rendered {
        0 => None,
        1 => Some(out),
        _ if parenthesize => Some(parenthesized(&out)),
        _ => Some(out),
    })
}

fn compile_op(key: &str, column: &str, operator: &str, value: &Param) -> Result<Statement> {
    match operator {
        "BETWEEN" | "NOT BETWEEN" => match value {
            Param::Value(Value::List(bounds)) if bounds.len() == 2 => Statement::build(
                &format!("{column} {operator} ? AND ?"),
                vec![bounds[0].clone().into(), bounds[1].clone().into()],
            ),
            _ => Err(SqlError::InvalidRange {
                column: key.to_string(),
                operator: operator.to_string(),
            }),
        },
        "IN" | "NOT IN" => match value {
            Param::Sql(_) => Statement::build(&format!("{column} {operator} (?)"), vec![value.clone()]),
            Param::Value(Value::List(_)) => Statement::build(&format!("{column} {operator} ?"), vec![value.clone()]),
            Param::Value(scalar) => Statement::build(
                &format!("{column} {operator} ?"),
                vec![Value::List(vec![scalar.clone()]).into()],
            ),
        },
        "IS" | "IS NOT" if matches!(value, Param::Value(Value::Null)) => {
            Ok(Statement::raw(format!("{column} {operator} NULL")))
        }
        "!=" | "<>" if matches!(value, Param::Value(Value::Null)) => {
            Ok(Statement::raw(format!("{column} IS NOT NULL")))
        }
        _ if matches!(value, Param::Value(Value::Null)) => Ok(Statement::raw(format!("{column} IS NULL"))),
        _ => Statement::build(&format!("{column} {operator} ?"), vec![value.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn template(tree: &Where) -> String {
        tree.compile().unwrap().map(|s| s.template()).unwrap_or_default()
    }

    #[test]
    fn test_empty_tree_yields_no_clause() {
        assert!(Where::new().compile().unwrap().is_none());
        assert!(Where::from_json(&json!({})).unwrap().compile().unwrap().is_none());
        assert!(Where::new().group(Where::new()).compile().unwrap().is_none());
    }

    #[test]
    fn test_range_operators() {
        let stmt = Where::from_json(&json!({"age": {"gte": 18, "lte": 65}}))
            .unwrap()
            .compile()
            .unwrap()
            .unwrap();
        assert_eq!(stmt.template(), "`age` >= ? AND `age` <= ?");
        assert_eq!(stmt.args(), &[Value::Int(18), Value::Int(65)]);
        assert_eq!(stmt.sql(), "`age` >= 18 AND `age` <= 65");
    }

    #[test]
    fn test_null_compiles_to_is_null() {
        assert_eq!(template(&Where::from_json(&json!({"status": null})).unwrap()), "`status` IS NULL");
        assert_eq!(template(&Where::from_json(&json!({"status": {"is": null}})).unwrap()), "`status` IS NULL");
        assert_eq!(
            template(&Where::from_json(&json!({"status": {"is not": null}})).unwrap()),
            "`status` IS NOT NULL"
        );
        assert_eq!(template(&Where::new().op("status", "neq", None::<i64>)), "`status` IS NOT NULL");
        assert_eq!(template(&Where::new().op("status", "gt", None::<i64>)), "`status` IS NULL");
    }

    #[test]
    fn test_string_values_are_bound() {
        let stmt = Where::new().eq("name", "ada").compile().unwrap().unwrap();
        assert_eq!(stmt.sql(), "`name` = :p__0");
        assert_eq!(stmt.bindings(), vec![("p__0".to_string(), &Value::Text("ada".into()))]);
    }

    #[test]
    fn test_combinator_prefix_links_to_previous_sibling() {
        let tree = Where::new().eq("or a", 1).eq("b", 2).eq("or c", 3).eq("not d", 4);
        assert_eq!(template(&tree), "`a` = ? AND `b` = ? OR `c` = ? AND NOT `d` = ?");
    }

    #[test]
    fn test_operator_aliases_are_case_insensitive() {
        let tree = Where::new()
            .op("a", "GT", 1)
            .op("b", "Lte", 2)
            .op("c", "equals", 3)
            .op("d", "NIN", vec![1, 2])
            .op("e", "is_not", None::<i64>)
            .op("f", "like", "x%");
        assert_eq!(
            template(&tree),
            "`a` > ? AND `b` <= ? AND `c` = ? AND `d` NOT IN ? AND `e` IS NOT NULL AND `f` LIKE ?"
        );
    }

    #[test]
    fn test_multiple_ops_parenthesized_among_siblings() {
        let tree = Where::new().eq("active", true).ops("age", [("gt", 1), ("or lt", 0)]);
        assert_eq!(template(&tree), "`active` = ? AND (`age` > ? OR `age` < ?)");
    }

    #[test]
    fn test_between_requires_two_values() {
        let stmt = Where::new().op("n", "between", vec![1, 5]).compile().unwrap().unwrap();
        assert_eq!(stmt.sql(), "`n` BETWEEN 1 AND 5");
        let err = Where::new().op("n", "not between", 3).compile().unwrap_err();
        assert!(matches!(err, SqlError::InvalidRange { .. }));
    }

    #[test]
    fn test_in_wraps_scalars_and_accepts_subqueries() {
        let stmt = Where::new().op("id", "in", 7).compile().unwrap().unwrap();
        assert_eq!(stmt.sql(), "`id` IN (7)");
        let sub = Statement::build("SELECT `id` FROM `users` WHERE `name` = ?", crate::args!["ada"]).unwrap();
        let stmt = Where::new().op("author_id", "in", sub).compile().unwrap().unwrap();
        assert_eq!(stmt.sql(), "`author_id` IN (SELECT `id` FROM `users` WHERE `name` = :p__0)");
        let stmt = Where::new().eq("id", vec!["a", "b"]).compile().unwrap().unwrap();
        assert_eq!(stmt.sql(), "`id` IN ('a', 'b')");
    }

    #[test]
    fn test_nested_groups_and_fragments() {
        let tree = Where::from_json(&json!([
            "deleted_at IS NULL",
            {"role": "admin", "or role": "owner"}
        ]))
        .unwrap();
        assert_eq!(template(&tree), "(deleted_at IS NULL) AND (`role` = ? OR `role` = ?)");
    }

    #[test]
    fn test_fragment_with_or_is_grouped_among_siblings() {
        let tree = Where::new().raw("`role` = 'admin' OR `role` = 'user'").op("age", "gt", 15);
        assert_eq!(template(&tree), "(`role` = 'admin' OR `role` = 'user') AND `age` > ?");
        let alone = Where::new().raw("`role` = 'admin' OR `role` = 'user'");
        assert_eq!(template(&alone), "`role` = 'admin' OR `role` = 'user'");
    }

    #[test]
    fn test_function_and_dotted_keys() {
        let tree = Where::new().op("count(p.id)", "gte", 2).eq("u.name", "x");
        assert_eq!(template(&tree), "COUNT(`p`.`id`) >= ? AND `u`.`name` = ?");
    }

    #[test]
    fn test_negated_operators_are_not_combinators() {
        let tree = Where::new().ops("id", [("gt", Param::from(0)), ("not in", Param::from(vec![3, 4]))]);
        assert_eq!(template(&tree), "`id` > ? AND `id` NOT IN ?");
        let tree = Where::new().ops("n", [("lt", 0), ("or gt", 9)]).op("s", "not like", "a%");
        assert_eq!(template(&tree), "(`n` < ? OR `n` > ?) AND `s` NOT LIKE ?");
    }

    #[test]
    fn test_invalid_operator_is_rejected() {
        let err = Where::new().op("a", "; DROP TABLE x", 1).compile().unwrap_err();
        assert!(matches!(err, SqlError::InvalidOperator(_)));
        for op in ["or", "AND", "not", "= 1 OR 1 =", "LIKE LIKE", ""] {
            let err = Where::new().op("a", op, 1).compile().unwrap_err();
            assert_eq!(err, SqlError::InvalidOperator(op.to_string()), "{op:?}");
        }
        assert_eq!(template(&Where::new().op("a", "not_glob", "x*")), "`a` NOT GLOB ?");
    }

    #[test]
    fn test_condition_from_raw_sql() {
        assert_eq!(Condition::from("1").compile().unwrap().unwrap().sql(), "1");
        assert!(Condition::from("").compile().unwrap().is_none());
    }
}
