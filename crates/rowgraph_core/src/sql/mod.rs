//! SQL generation.
//!
//! Renders a query object tree and its [`crate::Projection`] into one
//! parameterized `select` statement. Positional parameters are collected
//! in the order their `?` markers appear in the text.

mod condition;
mod generator;

pub use generator::{generate_sql, QueryParameter, SqlGenerator};
