//! Writing entity changes back to the database.
//!
//! A [`PersistRequest`] names entities and what to do with them. The
//! analyser classifies saves, follows owning relations and orders every
//! group by foreign keys; the [`Persister`] then validates against a fresh
//! snapshot, audits, filters unchanged updates, stamps optimistic locks and
//! executes batched DML.
//!
//! ```rust
//! use rowgraph_core::model::{ColumnSpec, DefinitionsSet, EntityTypeSpec, NodeType, SemanticType};
//! use rowgraph_core::persist::PersistRequest;
//! use rowgraph_core::{Environment, JdbcType, Value};
//! use rowgraph_sql::SqliteProvider;
//! use std::sync::Arc;
//!
//! let definitions = DefinitionsSet::builder()
//!     .entity_type(
//!         EntityTypeSpec::new("Tag")
//!             .table("TAG")
//!             .key("id")
//!             .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
//!             .node(NodeType::value("label", SemanticType::String, ColumnSpec::new("LABEL", JdbcType::Varchar))),
//!     )
//!     .build()
//!     .unwrap();
//! let provider = SqliteProvider::memory().unwrap();
//! provider.execute_script("create table TAG (ID integer primary key, LABEL text)").unwrap();
//! let env = Environment::builder(Arc::new(definitions), Arc::new(provider)).build();
//!
//! let mut ctx = env.new_context();
//! let tag = ctx.new_entity("Tag").unwrap();
//! ctx.set_value(tag, "id", 1i64).unwrap();
//! ctx.set_value(tag, "label", "rust").unwrap();
//! let result = ctx.persist(PersistRequest::new().insert(tag)).unwrap();
//! assert_eq!(result.inserted(), 1);
//!
//! // nothing changed, nothing written
//! let result = ctx.persist(PersistRequest::new().save(tag)).unwrap();
//! assert_eq!(result.statements(), 0);
//! assert_eq!(ctx.entity(tag).unwrap().value("label"), Some(&Value::from("rust")));
//! ```

mod analyser;
mod audit;
mod dependency;
mod group;
mod operation;
mod persister;

pub use audit::{AuditInformation, AuditRecord, Change};
pub use dependency::{DependencyTree, Direction};
pub use group::OperationGroup;
pub use operation::{Operation, OperationType, PersistRequest};
pub use persister::{PersistResult, Persister};
