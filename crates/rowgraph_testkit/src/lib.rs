//! # rowgraph Testkit
//!
//! Test utilities for rowgraph.
//!
//! This crate provides:
//! - A sample schema (authors, books, publishers and a shape hierarchy)
//!   with matching SQLite DDL
//! - Test environments over shared-memory or temporary-file databases
//! - A recording connection provider that captures every statement and can
//!   emulate multiple result sets
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use rowgraph_testkit::prelude::*;
//!
//! let env = TestEnvironment::memory();
//! let mut ctx = env.context();
//! let author = ctx.new_entity("Author").unwrap();
//! ctx.set_value(author, "id", 1i64).unwrap();
//! ctx.set_value(author, "name", "Le Guin").unwrap();
//! ctx.persist(PersistRequest::new().insert(author)).unwrap();
//! assert_eq!(env.count("AUTHOR"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::recording::*;
    pub use rowgraph_core::persist::PersistRequest;
    pub use rowgraph_core::{Config, CoreError, EntityContext, EntityId, EntityState, QueryObject, Value};
}

pub use fixtures::*;
pub use generators::*;
pub use recording::*;

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
