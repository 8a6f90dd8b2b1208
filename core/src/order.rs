//! `ORDER BY` lists and `JOIN` lists.

use std::sync::LazyLock;

use regex::Regex;

use crate::condition::Condition;
use crate::error::{Result, SqlError};
use crate::ident::{expression, is_index_key};
use crate::statement::Statement;

static DIRECTION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(asc|desc)\s+").expect("static regex must compile"));

/// Sort direction of an order entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Parses `asc` / `desc`, case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum OrderEntry {
    Raw(Statement),
    Nested(Order),
    Column { key: String, direction: Option<Direction> },
}

/// An ordered `ORDER BY` list.
///
/// Column keys may carry an `asc ` / `desc ` prefix. Like the combinator
/// prefix of where-trees, it only applies once a previous entry exists; on
/// the first entry it is stripped and ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    entries: Vec<OrderEntry>,
}

impl Order {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn asc(self, key: impl Into<String>) -> Self {
        self.by(key, Some(Direction::Asc))
    }

    pub fn desc(self, key: impl Into<String>) -> Self {
        self.by(key, Some(Direction::Desc))
    }

    /// Orders by `key`; with no explicit direction the key prefix or `ASC` applies.
    pub fn by(mut self, key: impl Into<String>, direction: Option<Direction>) -> Self {
        self.entries.push(OrderEntry::Column {
            key: key.into(),
            direction,
        });
        self
    }

    pub fn raw(mut self, fragment: impl Into<Statement>) -> Self {
        self.entries.push(OrderEntry::Raw(fragment.into()));
        self
    }

    pub fn nested(mut self, order: Order) -> Self {
        self.entries.push(OrderEntry::Nested(order));
        self
    }

    pub fn compile(&self) -> Option<Statement> {
        let mut out = Statement::raw("");
        let mut rendered = 0usize;

        for entry in &self.entries {
            let item = match entry {
                OrderEntry::Raw(stmt) if stmt.is_empty() => None,
                OrderEntry::Raw(stmt) => Some(stmt.clone()),
                OrderEntry::Nested(order) => order.compile(),
                OrderEntry::Column { key, direction } => {
                    let (prefix, key) = match DIRECTION_PREFIX.captures(key) {
                        Some(caps) => (Direction::parse(&caps[1]), &key[caps[0].len()..]),
                        None => (None, key.as_str()),
                    };
                    let prefix = prefix.filter(|_| rendered > 0);
                    let direction = prefix.or(*direction).unwrap_or_default();
                    Some(Statement::raw(format!("{} {}", expression(key), direction.as_sql())))
                }
            };

            let Some(item) = item else { continue };
            if rendered > 0 {
                out.push_sql(", ");
            }
            out.push_statement(&item);
            rendered += 1;
        }

        (rendered > 0).then_some(out)
    }

    /// Parses a JSON order list: a raw string, an array of raw strings and
    /// nested lists, or an object of `column → "asc" | "desc" | anything`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut order = Order::new();
        match json {
            serde_json::Value::Null => {}
            serde_json::Value::String(raw) => order = order.raw(raw.as_str()),
            serde_json::Value::Array(items) => {
                for item in items {
                    order = order.positional(item)?;
                }
            }
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    order = if is_index_key(key) {
                        order.positional(value)?
                    } else {
                        let direction = value.as_str().and_then(Direction::parse);
                        order.by(key.as_str(), direction)
                    };
                }
            }
            other => return Err(SqlError::input("order", format!("unsupported value {other}"))),
        }
        Ok(order)
    }

    fn positional(self, item: &serde_json::Value) -> Result<Self> {
        Ok(match item {
            serde_json::Value::String(raw) => self.raw(raw.as_str()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => self.nested(Order::from_json(item)?),
            _ => self,
        })
    }
}

impl From<&str> for Order {
    fn from(raw: &str) -> Self {
        Order::new().raw(raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum JoinEntry {
    Raw(Statement),
    On { key: String, condition: Condition },
}

/// A list of joins, each rendered `<JOIN TYPE> <table> ON <condition>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Joins {
    entries: Vec<JoinEntry>,
}

impl Joins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a join such as `add("LEFT JOIN `posts` p", Where::new().raw("p.user_id = u.id"))`.
    /// Joins whose condition compiles to nothing are skipped.
    pub fn add(mut self, key: impl Into<String>, condition: impl Into<Condition>) -> Self {
        self.entries.push(JoinEntry::On {
            key: key.into(),
            condition: condition.into(),
        });
        self
    }

    pub fn raw(mut self, fragment: impl Into<Statement>) -> Self {
        self.entries.push(JoinEntry::Raw(fragment.into()));
        self
    }

    pub fn compile(&self) -> Result<Option<Statement>> {
        let mut out = Statement::raw("");
        let mut rendered = 0usize;

        for entry in &self.entries {
            let item = match entry {
                JoinEntry::Raw(stmt) if stmt.is_empty() => continue,
                JoinEntry::Raw(stmt) => stmt.clone(),
                JoinEntry::On { key, condition } => {
                    let Some(cond) = condition.compile()? else { continue };
                    let mut item = Statement::raw(format!("{key} ON "));
                    item.push_statement(&cond);
                    item
                }
            };
            if rendered > 0 {
                out.push_sql(" ");
            }
            out.push_statement(&item);
            rendered += 1;
        }

        Ok((rendered > 0).then_some(out))
    }

    /// Parses a JSON join list: a raw string, an array of raw strings, or an
    /// object of `join key → where-tree`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut joins = Joins::new();
        match json {
            serde_json::Value::Null => {}
            serde_json::Value::String(raw) => joins = joins.raw(raw.as_str()),
            serde_json::Value::Array(items) => {
                for item in items {
                    let raw = item
                        .as_str()
                        .ok_or_else(|| SqlError::input("join", format!("expected a join clause, got {item}")))?;
                    joins = joins.raw(raw);
                }
            }
            serde_json::Value::Object(map) => {
                for (key, value) in map {
                    joins = joins.add(key.as_str(), Condition::from_json(value)?);
                }
            }
            other => return Err(SqlError::input("join", format!("unsupported value {other}"))),
        }
        Ok(joins)
    }
}

impl From<&str> for Joins {
    fn from(raw: &str) -> Self {
        Joins::new().raw(raw)
    }
}
