//! # rowgraph Core
//!
//! Object-relational query and persistence engine.
//!
//! This crate provides:
//! - Entity type metadata and the metadata provider interface
//! - An in-memory entity graph with lifecycle and delta tracking
//! - A typed query object model with joins, conditions and sub-queries
//! - Projection planning and vendor-aware SQL generation
//! - Result loading with identity mapping and subtype downcasting
//! - Dependency-ordered, audited, optimistically locked persistence

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod environment;
mod error;
mod plugins;
mod projection;
mod statement;
mod types;

pub mod entity;
pub mod executer;
pub mod jdbc;
pub mod model;
pub mod persist;
pub mod query;
pub mod sql;

pub use config::{Config, PessimisticValidation};
pub use entity::{Entity, EntityContext, EntityId, EntityState};
pub use environment::{Environment, EnvironmentBuilder};
pub use error::{CoreError, CoreResult};
pub use executer::QueryResult;
pub use persist::{PersistRequest, PersistResult};
pub use plugins::{
    AccessRightsChecker, Auditor, CollectingAuditor, LoggingAccessRightsChecker, LoggingAuditor,
    MaxKeySequenceGenerator, Plugins, SequenceGenerator,
};
pub use projection::{Projection, ProjectionColumn};
pub use query::{Condition, QueryObject};
pub use statement::{Bind, DmlKind, PreparedDml, StatementCache};
pub use types::Value;

pub use rowgraph_sql::{Capabilities, Connection, ConnectionProvider, Dialect, JdbcType, LockMode, SqlValue};
