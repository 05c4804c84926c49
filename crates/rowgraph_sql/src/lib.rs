//! # rowgraph SQL
//!
//! Connection abstraction for rowgraph.
//!
//! This crate provides the lowest-level database abstraction the engine
//! talks to. Connections are **JDBC-style statement executors**: they take
//! SQL text with positional `?` parameters and return rows of driver values.
//! They know nothing about entities, projections or audit trails.
//!
//! ## Design Principles
//!
//! - One [`Connection`] per unit of work, never shared across threads
//! - Drivers report what they can do through [`Capabilities`]
//! - Values cross the boundary as [`SqlValue`], typed by [`JdbcType`]
//! - The engine owns all SQL generation and value interpretation
//!
//! ## Available Drivers
//!
//! - [`SqliteConnection`] - SQLite through `rusqlite`, in-memory or file-backed
//!
//! ## Example
//!
//! ```rust
//! use rowgraph_sql::{Connection, SqliteConnection, SqlValue};
//!
//! let mut conn = SqliteConnection::open_in_memory().unwrap();
//! conn.execute("create table t (id integer primary key, name text)", &[]).unwrap();
//! conn.execute("insert into t values (?, ?)", &[SqlValue::Integer(1), SqlValue::from("a")]).unwrap();
//! let rs = conn.query("select name from t where id = ?", &[SqlValue::Integer(1)]).unwrap();
//! assert_eq!(rs.value(0, 0), Some(&SqlValue::from("a")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capabilities;
mod connection;
mod error;
mod sqlite;
mod value;

pub use capabilities::{Capabilities, Dialect, LockMode};
pub use connection::{BatchCounts, Connection, ConnectionProvider, ResultSet};
pub use error::{SqlError, SqlResult};
pub use sqlite::{SqliteConnection, SqliteProvider};
pub use value::{JdbcType, SqlValue};
