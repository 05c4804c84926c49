//! The in-memory entity graph.

mod context;
#[allow(clippy::module_inception)]
mod entity;
mod id;

pub use context::EntityContext;
pub use entity::{Entity, EntityConstraints, EntityState, Node, NodeValue, RefNode, ToManyNode, ValueNode};
pub use id::EntityId;

pub(crate) use context::SharedConnection;
