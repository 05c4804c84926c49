//! Entity type metadata.
//!
//! Metadata is immutable once built. [`DefinitionsBuilder`] validates the
//! declared types, flattens every inheritance chain once, and produces a
//! [`DefinitionsSet`] that the rest of the engine reads through the
//! [`Definitions`] trait.

mod converter;
mod definitions;
mod entity_type;
mod node_type;

pub use converter::TypeConverter;
pub use definitions::{Definitions, DefinitionsBuilder, DefinitionsSet};
pub use entity_type::{EntityType, EntityTypeSpec, KeyGeneration};
pub use node_type::{ColumnSpec, EnumType, NodeType, RelationKind, RelationSpec, SemanticType};
