//! Error types for statement construction and execution.

use thiserror::Error;

/// Errors raised while building or executing a [`Statement`](crate::Statement).
///
/// Every variant carries owned text only, so the type is `Clone`: a failed
/// execution is cached on the statement and handed out again on later calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlError {
    /// The number of `?` markers in a template does not match the arguments.
    #[error("template has {markers} placeholder(s) but {given} argument(s) were given")]
    ArgumentCount { markers: usize, given: usize },

    /// An operator in a where-tree is not a recognizable SQL operator.
    #[error("invalid operator '{0}'")]
    InvalidOperator(String),

    /// `between` / `not between` received something other than two values.
    #[error("operator '{operator}' on '{column}' expects a list of exactly two values")]
    InvalidRange { column: String, operator: String },

    /// Structured input (JSON where-tree, order list, options) had the wrong shape.
    #[error("invalid {context}: {message}")]
    InvalidInput { context: &'static str, message: String },

    /// A write statement ended up with nothing to write after column filtering.
    #[error("no writable columns left for table {0}")]
    EmptyPayload(String),

    /// An `UPDATE` or `DELETE` whose condition compiled to nothing. A
    /// statement that touches every row needs an explicit `"1"`.
    #[error("refusing to change every row of {0} without a condition; pass \"1\" to select all rows")]
    EmptyCondition(String),

    /// The executor could not obtain a connection. Never cached on a statement.
    #[error("connection error: {0}")]
    Connection(String),

    /// The database rejected the statement.
    #[error("failed to execute `{sql}`: {message}")]
    Execution { sql: String, message: String },
}

impl SqlError {
    pub(crate) fn input(context: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            context,
            message: message.into(),
        }
    }
}

/// Convenience alias for results with [`SqlError`].
pub type Result<T> = std::result::Result<T, SqlError>;
