//! Composable, parameterized SQL statements and the clause builders that
//! produce them.
//!
//! This crate has no database dependency. It provides:
//!
//! - [`Statement`]: SQL text plus ordered arguments, executed at most once
//!   through an [`Executor`].
//! - [`Value`] / [`Param`]: typed arguments, encoded as literals, bound
//!   placeholders or inlined statements ([`Encoded`]).
//! - Clause builders: [`Columns`], [`TableRef`], [`Where`] / [`Condition`],
//!   [`Order`] and [`Joins`], each also parseable from JSON.
//! - Statement assembly: [`select`], [`count`], [`insert`], [`insert_many`],
//!   [`update`] and [`delete`] driven by a [`Query`] or a [`Record`].
//!
//! # Example
//!
//! ```
//! use quarry_core::*;
//!
//! let query = Query::new()
//!     .columns(vec!["id", "name"])
//!     .filter(Where::new().ops("age", [("gte", 18), ("lte", 65)]).eq("role", "admin"))
//!     .order(Order::new().desc("created_at"))
//!     .limit(10);
//!
//! let stmt = select("users", &query).unwrap();
//! assert_eq!(
//!     stmt.sql(),
//!     "SELECT `id`, `name` FROM `users` WHERE (`age` >= 18 AND `age` <= 65) AND `role` = :p__0 \
//!      ORDER BY `created_at` DESC LIMIT 10"
//! );
//! assert_eq!(stmt.bindings(), vec![("p__0".to_string(), &Value::Text("admin".into()))]);
//! ```

mod condition;
mod error;
mod ident;
mod order;
mod query;
mod result;
mod statement;
mod value;

pub use condition::{Condition, Where};
pub use error::{Result, SqlError};
pub use ident::{Columns, TableRef, column, is_identifier, quote, schema_and_table, table, table_name};
pub use order::{Direction, Joins, Order};
pub use query::{Query, Record, count, delete, insert, insert_many, select, update};
pub use result::{ResultSet, Row};
pub use statement::{Executor, Statement};
pub use value::{Encoded, Param, Value, encode, literal, quote_string};
