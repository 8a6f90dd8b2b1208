//! The [`Statement`] type: a composable, execute-once SQL fragment.
//!
//! A statement is a sequence of SQL text segments interleaved with
//! positional arguments. Composition never re-scans text: embedding one
//! statement into another appends its segments and renumbers its arguments,
//! so placeholder names stay unique however deeply statements are nested.
//!
//! Three renderings exist:
//!
//! - [`Statement::sql`]: the driver form, strings replaced by `:p__N`
//!   placeholders (see [`Statement::bindings`]);
//! - [`Statement::template`]: every argument shown as `?`;
//! - `Display`: everything substituted as literals, for logs and history.

use std::cell::OnceCell;
use std::fmt;

use crate::error::{Result, SqlError};
use crate::result::{ResultSet, Row};
use crate::value::{Encoded, Param, Value, encode_value, literal};

/// Runs driver-form SQL on behalf of a [`Statement`].
///
/// Implemented by the connection owner. `record` receives the display form of
/// each statement executed with history enabled.
pub trait Executor {
    /// Prepares and runs `sql`, binding each `(placeholder_name, value)` pair.
    ///
    /// Return [`SqlError::Connection`] when no connection could be obtained;
    /// that error is passed through without being cached on the statement.
    fn run(&self, sql: &str, bindings: &[(String, &Value)]) -> Result<ResultSet>;

    /// Appends an executed statement to the diagnostic history.
    fn record(&self, _statement: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Arg(usize),
}

/// An immutable-once-built SQL fragment with ordered arguments.
///
/// Execution happens at most once per instance: the first call to
/// [`execute`](Self::execute) runs the SQL and caches the outcome, success or
/// failure, and later calls return the cached outcome. Cloning yields a fresh,
/// unexecuted statement with the same SQL.
#[derive(Debug)]
pub struct Statement {
    parts: Vec<Part>,
    args: Vec<Value>,
    outcome: OnceCell<Result<ResultSet>>,
}

impl Statement {
    fn new() -> Self {
        Self {
            parts: Vec::new(),
            args: Vec::new(),
            outcome: OnceCell::new(),
        }
    }

    /// Wraps SQL text verbatim. No `?` substitution takes place.
    pub fn raw(sql: impl Into<String>) -> Self {
        let mut stmt = Self::new();
        stmt.push_sql(&sql.into());
        stmt
    }

    /// Builds a statement from a template and positional arguments.
    ///
    /// Each `?` in `template`, scanning left to right, is bound to the next
    /// argument. Nested statements are inlined and their arguments merged.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::ArgumentCount`] if the number of `?` markers
    /// differs from the number of arguments.
    pub fn build(template: &str, args: Vec<Param>) -> Result<Self> {
        let markers = template.matches('?').count();
        if markers != args.len() {
            return Err(SqlError::ArgumentCount {
                markers,
                given: args.len(),
            });
        }

        let mut stmt = Self::new();
        let mut pieces = template.split('?');
        if let Some(first) = pieces.next() {
            stmt.push_sql(first);
        }
        for (piece, arg) in pieces.zip(args) {
            stmt.push_param(arg);
            stmt.push_sql(piece);
        }
        Ok(stmt)
    }

    pub(crate) fn push_sql(&mut self, sql: &str) {
        if sql.is_empty() {
            return;
        }
        if let Some(Part::Text(last)) = self.parts.last_mut() {
            last.push_str(sql);
        } else {
            self.parts.push(Part::Text(sql.to_string()));
        }
    }

    pub(crate) fn push_value(&mut self, value: Value) {
        self.parts.push(Part::Arg(self.args.len()));
        self.args.push(value);
    }

    pub(crate) fn push_statement(&mut self, other: &Statement) {
        let offset = self.args.len();
        for part in &other.parts {
            match part {
                Part::Text(text) => self.push_sql(text),
                Part::Arg(index) => self.parts.push(Part::Arg(index + offset)),
            }
        }
        self.args.extend(other.args.iter().cloned());
    }

    pub(crate) fn push_param(&mut self, param: Param) {
        match param {
            Param::Value(value) => self.push_value(value),
            Param::Sql(stmt) => self.push_statement(&stmt),
        }
    }

    /// Returns `true` if the statement renders to no SQL at all.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            Part::Text(text) => text.trim().is_empty(),
            Part::Arg(_) => false,
        })
    }

    /// The flattened positional arguments, in order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Placeholder name for the argument at `index`, zero-padded to the digit
    /// width of the argument count (`p__0` … `p__9`, `p__00` … `p__99`, …).
    pub fn placeholder(&self, index: usize) -> String {
        let width = self.args.len().to_string().len();
        format!("p__{index:0width$}")
    }

    /// The SQL sent to the driver: literals inlined, strings and blobs as
    /// `:p__N` placeholders.
    pub fn sql(&self) -> String {
        self.render(|index, value| match encode_value(value) {
            Encoded::Bound(_) => format!(":{}", self.placeholder(index)),
            Encoded::Literal(text) => text,
            Encoded::Inline(inner) => inner.sql(),
        })
    }

    /// The named bindings referenced by [`sql`](Self::sql), in order.
    pub fn bindings(&self) -> Vec<(String, &Value)> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, value)| matches!(encode_value(value), Encoded::Bound(_)))
            .map(|(index, value)| (self.placeholder(index), value))
            .collect()
    }

    /// The statement with every argument shown as `?`.
    pub fn template(&self) -> String {
        self.render(|_, _| "?".to_string())
    }

    fn render(&self, mut arg: impl FnMut(usize, &Value) -> String) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Arg(index) => out.push_str(&arg(*index, &self.args[*index])),
            }
        }
        out
    }

    /// Executes the statement once, recording it in the executor's history.
    ///
    /// # Errors
    ///
    /// Returns the cached [`SqlError::Execution`] if this or an earlier call
    /// failed, or [`SqlError::Connection`] if no connection was available.
    pub fn execute<E: Executor + ?Sized>(&self, executor: &E) -> Result<&ResultSet> {
        self.run(executor, true)
    }

    /// Like [`execute`](Self::execute) but leaves the history untouched.
    pub fn execute_quiet<E: Executor + ?Sized>(&self, executor: &E) -> Result<&ResultSet> {
        self.run(executor, false)
    }

    fn run<E: Executor + ?Sized>(&self, executor: &E, record: bool) -> Result<&ResultSet> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.as_ref().map_err(Clone::clone);
        }

        if record {
            executor.record(&self.to_string());
        }

        let result = match executor.run(&self.sql(), &self.bindings()) {
            Err(SqlError::Connection(message)) => return Err(SqlError::Connection(message)),
            Err(SqlError::Execution { message, .. }) => Err(SqlError::Execution {
                sql: self.to_string(),
                message,
            }),
            other => other,
        };

        self.outcome
            .get_or_init(|| result)
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Returns `true` once an execution attempt has completed.
    pub fn is_executed(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// The error captured by a failed execution, if any.
    pub fn last_error(&self) -> Option<&SqlError> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().err())
    }

    /// Executes (once) and returns every row.
    pub fn fetch_all<E: Executor + ?Sized>(&self, executor: &E) -> Result<Vec<Row<'_>>> {
        Ok(self.execute(executor)?.rows().collect())
    }

    /// Executes (once) and returns the first row, if any.
    pub fn fetch_one<E: Executor + ?Sized>(&self, executor: &E) -> Result<Option<Row<'_>>> {
        Ok(self.execute(executor)?.first())
    }

    /// Executes (once) and returns the first column of every row.
    pub fn fetch_column<E: Executor + ?Sized>(&self, executor: &E) -> Result<Vec<&Value>> {
        Ok(self.execute(executor)?.column_values(0))
    }

    /// Executes (once) and returns the number of affected rows.
    pub fn affected<E: Executor + ?Sized>(&self, executor: &E) -> Result<usize> {
        Ok(self.execute(executor)?.affected)
    }
}

impl Clone for Statement {
    fn clone(&self) -> Self {
        Self {
            parts: self.parts.clone(),
            args: self.args.clone(),
            outcome: OnceCell::new(),
        }
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts && self.args == other.args
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|_, value| literal(value)))
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::raw(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::raw(sql)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::args;

    /// Executor that counts calls and optionally fails.
    #[derive(Default)]
    struct FakeExecutor {
        calls: Cell<usize>,
        history: RefCell<Vec<String>>,
        fail_with: Option<SqlError>,
    }

    impl Executor for FakeExecutor {
        fn run(&self, sql: &str, _bindings: &[(String, &Value)]) -> Result<ResultSet> {
            self.calls.set(self.calls.get() + 1);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(ResultSet {
                    columns: vec!["sql".into()],
                    rows: vec![vec![Value::Text(sql.to_string())]],
                    affected: 1,
                    last_insert_id: 0,
                }),
            }
        }

        fn record(&self, statement: &str) {
            self.history.borrow_mut().push(statement.to_string());
        }
    }

    #[test]
    fn test_build_generates_unique_placeholders_left_to_right() {
        let stmt = Statement::build("a = ? AND b = ? OR c = ?", args!["x", "y", "z"]).unwrap();
        assert_eq!(stmt.sql(), "a = :p__0 AND b = :p__1 OR c = :p__2");
        let names: Vec<String> = stmt.bindings().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["p__0", "p__1", "p__2"]);
        assert_eq!(stmt.bindings()[2].1, &Value::Text("z".into()));
    }

    #[test]
    fn test_placeholders_are_padded_to_argument_count_width() {
        let template = vec!["?"; 11].join(", ");
        let args: Vec<Param> = (0..11).map(|i| Param::from(format!("v{i}"))).collect();
        let stmt = Statement::build(&template, args).unwrap();
        let names: Vec<String> = stmt.bindings().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.first().unwrap(), "p__00");
        assert_eq!(names.last().unwrap(), "p__10");
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn test_argument_count_mismatch_is_rejected() {
        let err = Statement::build("a = ? AND b = ?", args![1]).unwrap_err();
        assert_eq!(err, SqlError::ArgumentCount { markers: 2, given: 1 });
    }

    #[test]
    fn test_literals_are_inlined() {
        let stmt = Statement::build("VALUES (?, ?, ?, ?, ?)", args![1, 2.5, true, None::<i64>, vec![1, 2]]).unwrap();
        assert_eq!(stmt.sql(), "VALUES (1, 2.5, 1, NULL, (1, 2))");
        assert!(stmt.bindings().is_empty());
        assert_eq!(stmt.template(), "VALUES (?, ?, ?, ?, ?)");
    }

    #[test]
    fn test_nested_statement_is_inlined_and_arguments_merged() {
        let inner = Statement::build("`name` = ?", args!["ada"]).unwrap();
        let outer = Statement::build("SELECT * FROM t WHERE ? AND `role` = ?", args![inner, "admin"]).unwrap();
        assert_eq!(outer.sql(), "SELECT * FROM t WHERE `name` = :p__0 AND `role` = :p__1");
        assert_eq!(outer.template(), "SELECT * FROM t WHERE `name` = ? AND `role` = ?");
        assert_eq!(outer.args(), &[Value::Text("ada".into()), Value::Text("admin".into())]);
    }

    #[test]
    fn test_raw_keeps_question_marks() {
        let stmt = Statement::raw("SELECT '?'");
        assert_eq!(stmt.sql(), "SELECT '?'");
        let outer = Statement::build("? UNION ?", args![&stmt, "x"]).unwrap();
        assert_eq!(outer.to_string(), "SELECT '?' UNION 'x'");
    }

    #[test]
    fn test_display_substitutes_quoted_strings() {
        let stmt = Statement::build("`a` = ?", args!["o'neil"]).unwrap();
        assert_eq!(stmt.to_string(), "`a` = 'o''neil'");
    }

    #[test]
    fn test_execute_runs_at_most_once() {
        let executor = FakeExecutor::default();
        let stmt = Statement::build("SELECT ?", args!["x"]).unwrap();

        let first = stmt.execute(&executor).unwrap().clone();
        let second = stmt.execute(&executor).unwrap();
        assert_eq!(&first, second);
        assert_eq!(executor.calls.get(), 1);
        assert_eq!(*executor.history.borrow(), vec!["SELECT 'x'".to_string()]);
        assert!(stmt.is_executed());
        assert_eq!(stmt.to_string(), "SELECT 'x'");
    }

    #[test]
    fn test_clone_is_unexecuted() {
        let executor = FakeExecutor::default();
        let stmt = Statement::raw("SELECT 1");
        stmt.execute(&executor).unwrap();
        let copy = stmt.clone();
        assert!(!copy.is_executed());
        assert_eq!(copy, stmt);
    }

    #[test]
    fn test_execute_quiet_skips_history() {
        let executor = FakeExecutor::default();
        Statement::raw("SELECT 1").execute_quiet(&executor).unwrap();
        assert!(executor.history.borrow().is_empty());
    }

    #[test]
    fn test_failure_is_cached_and_not_retried() {
        let executor = FakeExecutor {
            fail_with: Some(SqlError::Execution {
                sql: String::new(),
                message: "no such table: t".into(),
            }),
            ..Default::default()
        };
        let stmt = Statement::raw("SELECT * FROM t");
        let err = stmt.execute(&executor).unwrap_err();
        assert!(matches!(&err, SqlError::Execution { sql, .. } if sql == "SELECT * FROM t"));
        assert_eq!(stmt.execute(&executor).unwrap_err(), err);
        assert_eq!(executor.calls.get(), 1);
        assert_eq!(stmt.last_error(), Some(&err));
    }

    #[test]
    fn test_connection_failure_is_not_cached() {
        let executor = FakeExecutor {
            fail_with: Some(SqlError::Connection("refused".into())),
            ..Default::default()
        };
        let stmt = Statement::raw("SELECT 1");
        assert!(matches!(stmt.execute(&executor), Err(SqlError::Connection(_))));
        assert!(!stmt.is_executed());
        assert!(stmt.execute(&executor).is_err());
        assert_eq!(executor.calls.get(), 2);
    }

    #[test]
    fn test_fetch_helpers() {
        let executor = FakeExecutor::default();
        let stmt = Statement::raw("SELECT 1");
        assert_eq!(stmt.fetch_column(&executor).unwrap(), vec![&Value::Text("SELECT 1".into())]);
        assert_eq!(stmt.affected(&executor).unwrap(), 1);
        assert!(stmt.fetch_one(&executor).unwrap().is_some());
        assert_eq!(stmt.fetch_all(&executor).unwrap().len(), 1);
        assert_eq!(executor.calls.get(), 1);
    }
}
