//! Entity type metadata.

use crate::model::NodeType;
use std::collections::HashMap;

/// Who assigns primary keys to new entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyGeneration {
    /// The application sets the key before persisting.
    #[default]
    Client,
    /// The persister asks the [`crate::SequenceGenerator`] for a key.
    Framework,
}

/// Declaration of an entity type, before inheritance is flattened.
#[derive(Debug, Clone)]
pub struct EntityTypeSpec {
    pub(crate) name: String,
    pub(crate) table: Option<String>,
    pub(crate) key_node: Option<String>,
    pub(crate) is_abstract: bool,
    pub(crate) parent: Option<String>,
    pub(crate) nodes: Vec<NodeType>,
    pub(crate) key_generation: Option<KeyGeneration>,
}

impl EntityTypeSpec {
    /// Starts a declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            key_node: None,
            is_abstract: false,
            parent: None,
            nodes: Vec::new(),
            key_generation: None,
        }
    }

    /// Sets the table. Subtypes inherit their parent's table when unset.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Names the primary key node.
    #[must_use]
    pub fn key(mut self, node: impl Into<String>) -> Self {
        self.key_node = Some(node.into());
        self
    }

    /// Marks the type abstract; loaded rows are downcast to a subtype.
    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declares the parent type.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Adds a node. A node named like an inherited one replaces it.
    #[must_use]
    pub fn node(mut self, node: NodeType) -> Self {
        self.nodes.push(node);
        self
    }

    /// Sets the key generation policy.
    #[must_use]
    pub fn key_generation(mut self, policy: KeyGeneration) -> Self {
        self.key_generation = Some(policy);
        self
    }
}

/// A mapped entity type with its flattened node set.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) key_node: String,
    pub(crate) is_abstract: bool,
    pub(crate) parent: Option<String>,
    pub(crate) ancestors: Vec<String>,
    pub(crate) nodes: Vec<NodeType>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) key_generation: KeyGeneration,
    pub(crate) discriminators: Vec<String>,
}

impl EntityType {
    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the primary key node name.
    #[must_use]
    pub fn key_node_name(&self) -> &str {
        &self.key_node
    }

    /// Returns the primary key node.
    #[must_use]
    pub fn key_node(&self) -> &NodeType {
        // The builder guarantees the key node is present.
        &self.nodes[self.index[&self.key_node]]
    }

    /// Returns `true` if rows of this type must be downcast.
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Returns the parent type name.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Returns the root of the inheritance chain.
    ///
    /// Identity within a context is keyed by (root, key).
    #[must_use]
    pub fn root(&self) -> &str {
        self.ancestors.last().map_or(&self.name, String::as_str)
    }

    /// Returns `true` if this type is `other` or extends it.
    #[must_use]
    pub fn is_a(&self, other: &str) -> bool {
        self.name == other || self.ancestors.iter().any(|a| a == other)
    }

    /// Returns all nodes, inherited ones first.
    #[must_use]
    pub fn nodes(&self) -> &[NodeType] {
        &self.nodes
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeType> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Returns the position of a node in [`EntityType::nodes`].
    #[must_use]
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the optimistic lock node, if the type has one.
    #[must_use]
    pub fn lock_node(&self) -> Option<&NodeType> {
        self.nodes.iter().find(|n| n.is_optimistic_lock())
    }

    /// Returns the key generation policy.
    #[must_use]
    pub const fn key_generation(&self) -> KeyGeneration {
        self.key_generation
    }

    /// Returns `true` if `node` is fixed by this type or one of its subtypes.
    #[must_use]
    pub fn is_discriminator(&self, node: &str) -> bool {
        self.discriminators.iter().any(|d| d == node)
    }

    /// Returns the nodes that carry this type's discriminator values.
    pub fn fixed_nodes(&self) -> impl Iterator<Item = &NodeType> {
        self.nodes.iter().filter(|n| n.fixed().is_some())
    }

    /// Returns the nodes mapped to a column.
    pub fn column_nodes(&self) -> impl Iterator<Item = &NodeType> {
        self.nodes.iter().filter(|n| n.column().is_some())
    }
}
