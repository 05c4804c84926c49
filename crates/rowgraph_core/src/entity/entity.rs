//! Entities and their nodes.

use crate::entity::EntityId;
use crate::model::{EntityType, NodeType};
use crate::types::Value;
use std::sync::Arc;

/// Lifecycle state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Known by key only; its row has not been read.
    NotLoaded,
    /// Being populated from a result set.
    Loading,
    /// Populated from, or written to, the database.
    Loaded,
    /// Not present in the database (new or deleted).
    NotInDb,
}

/// What the entity is known to require of the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityConstraints {
    /// The row must exist (the entity was loaded by a query).
    pub must_exist_in_db: bool,
    /// The row must not exist (the entity was created as new).
    pub must_not_exist_in_db: bool,
}

/// The content of a scalar slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    /// The column was not part of the projection that loaded the entity.
    NotLoaded,
    /// A loaded or assigned value, possibly null.
    Loaded(Value),
}

impl NodeValue {
    /// Returns the value, if loaded.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::NotLoaded => None,
            Self::Loaded(v) => Some(v),
        }
    }

    /// Returns `true` if a value is present (null counts).
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Returns the value, treating "not loaded" as null.
    #[must_use]
    pub fn or_null(&self) -> Value {
        self.value().cloned().unwrap_or(Value::Null)
    }
}

/// A scalar column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueNode {
    pub(crate) value: NodeValue,
}

impl ValueNode {
    /// Returns the slot content.
    #[must_use]
    pub const fn value(&self) -> &NodeValue {
        &self.value
    }
}

/// A foreign key and the entity it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefNode {
    pub(crate) fk: NodeValue,
    pub(crate) reference: Option<EntityId>,
    pub(crate) changed: bool,
}

impl RefNode {
    /// Returns the foreign key scalar.
    #[must_use]
    pub const fn foreign_key(&self) -> &NodeValue {
        &self.fk
    }

    /// Returns the resolved target.
    #[must_use]
    pub const fn reference(&self) -> Option<EntityId> {
        self.reference
    }

    /// Returns `true` if the reference was reassigned since the last persist.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        self.changed
    }
}

/// A collection of entities whose back reference points at the owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToManyNode {
    pub(crate) fetched: bool,
    pub(crate) entities: Vec<EntityId>,
    pub(crate) added: Vec<EntityId>,
    pub(crate) removed: Vec<EntityId>,
}

impl ToManyNode {
    /// Returns `true` once the collection reflects the database.
    #[must_use]
    pub const fn is_fetched(&self) -> bool {
        self.fetched
    }

    /// Returns the members.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Returns members added since the last persist.
    #[must_use]
    pub fn added(&self) -> &[EntityId] {
        &self.added
    }

    /// Returns members removed since the last persist.
    #[must_use]
    pub fn removed(&self) -> &[EntityId] {
        &self.removed
    }

    pub(crate) fn clear_deltas(&mut self) {
        self.added.clear();
        self.removed.clear();
    }
}

/// One attribute slot of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Scalar column.
    Value(ValueNode),
    /// Foreign key reference.
    Ref(RefNode),
    /// To-many collection.
    ToMany(ToManyNode),
}

impl Node {
    /// Creates the empty slot for a node type.
    pub(crate) fn not_loaded(node_type: &NodeType) -> Self {
        if node_type.is_to_many() {
            Self::ToMany(ToManyNode::default())
        } else if node_type.is_reference() {
            Self::Ref(RefNode {
                fk: NodeValue::NotLoaded,
                reference: None,
                changed: false,
            })
        } else {
            Self::Value(ValueNode {
                value: NodeValue::NotLoaded,
            })
        }
    }

    /// Creates the slot of a brand new entity: nulls, empty fetched
    /// collections, and the type's fixed value.
    pub(crate) fn fresh(node_type: &NodeType) -> Self {
        let initial = node_type.fixed().cloned().unwrap_or(Value::Null);
        match Self::not_loaded(node_type) {
            Self::ToMany(mut many) => {
                many.fetched = true;
                Self::ToMany(many)
            }
            Self::Ref(mut r) => {
                r.fk = NodeValue::Loaded(initial);
                Self::Ref(r)
            }
            Self::Value(_) => Self::Value(ValueNode {
                value: NodeValue::Loaded(initial),
            }),
        }
    }

    /// Returns the scalar of a value or reference node.
    #[must_use]
    pub const fn scalar(&self) -> Option<&NodeValue> {
        match self {
            Self::Value(v) => Some(&v.value),
            Self::Ref(r) => Some(&r.fk),
            Self::ToMany(_) => None,
        }
    }
}

/// A unit of row identity in an [`crate::EntityContext`].
///
/// `nodes` is parallel to the flattened node list of the entity type.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) entity_type: Arc<EntityType>,
    pub(crate) state: EntityState,
    pub(crate) constraints: EntityConstraints,
    pub(crate) nodes: Vec<Node>,
}

impl Entity {
    pub(crate) fn new(entity_type: Arc<EntityType>, state: EntityState, fresh: bool) -> Self {
        let nodes = entity_type
            .nodes()
            .iter()
            .map(|n| if fresh { Node::fresh(n) } else { Node::not_loaded(n) })
            .collect();
        Self {
            id: EntityId::new(),
            entity_type,
            state,
            constraints: EntityConstraints::default(),
            nodes,
        }
    }

    /// Returns the identity of the entity.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EntityState {
        self.state
    }

    /// Returns the database constraints.
    #[must_use]
    pub const fn constraints(&self) -> EntityConstraints {
        self.constraints
    }

    /// Returns all node slots.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns a slot by node name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.entity_type.node_index(name).map(|i| &self.nodes[i])
    }

    /// Returns the primary key, or `None` while it is unset or null.
    #[must_use]
    pub fn key(&self) -> Option<&Value> {
        self.node(self.entity_type.key_node_name())
            .and_then(Node::scalar)
            .and_then(NodeValue::value)
            .filter(|v| !v.is_null())
    }

    /// Returns a loaded scalar by node name.
    ///
    /// Reference nodes return their foreign key.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.node(name).and_then(Node::scalar).and_then(NodeValue::value)
    }

    /// Returns the optimistic lock value, if the type has a lock.
    #[must_use]
    pub fn lock_value(&self) -> Option<&Value> {
        self.entity_type
            .lock_node()
            .and_then(|n| self.value(n.name()))
    }

    /// Returns the resolved target of a reference node.
    #[must_use]
    pub fn reference(&self, name: &str) -> Option<EntityId> {
        match self.node(name) {
            Some(Node::Ref(r)) => r.reference,
            _ => None,
        }
    }

    /// Returns a to-many collection by node name.
    #[must_use]
    pub fn to_many(&self, name: &str) -> Option<&ToManyNode> {
        match self.node(name) {
            Some(Node::ToMany(m)) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn scalar_mut(&mut self, index: usize) -> Option<&mut NodeValue> {
        match self.nodes.get_mut(index) {
            Some(Node::Value(v)) => Some(&mut v.value),
            Some(Node::Ref(r)) => Some(&mut r.fk),
            _ => None,
        }
    }

    pub(crate) fn ref_mut(&mut self, index: usize) -> Option<&mut RefNode> {
        match self.nodes.get_mut(index) {
            Some(Node::Ref(r)) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn to_many_mut(&mut self, index: usize) -> Option<&mut ToManyNode> {
        match self.nodes.get_mut(index) {
            Some(Node::ToMany(m)) => Some(m),
            _ => None,
        }
    }

    /// Switches to a subtype, keeping every inherited slot.
    ///
    /// Flattening keeps inherited nodes first and in order, so the slots of
    /// the supertype are a prefix of the subtype's.
    pub(crate) fn upgrade_type(&mut self, subtype: Arc<EntityType>) {
        for node in &subtype.nodes()[self.nodes.len().min(subtype.nodes().len())..] {
            self.nodes.push(Node::not_loaded(node));
        }
        self.entity_type = subtype;
    }

    /// Resets every slot except the key to "not loaded".
    pub(crate) fn reset_nodes(&mut self) {
        let key = self.entity_type.node_index(self.entity_type.key_node_name());
        for (i, (slot, node_type)) in self.nodes.iter_mut().zip(self.entity_type.nodes()).enumerate() {
            if Some(i) != key {
                *slot = Node::not_loaded(node_type);
            }
        }
    }

    /// Clears reference and collection change tracking.
    pub(crate) fn clear_deltas(&mut self) {
        for node in &mut self.nodes {
            match node {
                Node::Ref(r) => r.changed = false,
                Node::ToMany(m) => m.clear_deltas(),
                Node::Value(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, Definitions, DefinitionsSet, EntityTypeSpec, RelationKind, SemanticType};
    use rowgraph_sql::JdbcType;

    fn definitions() -> DefinitionsSet {
        DefinitionsSet::builder()
            .entity_type(
                EntityTypeSpec::new("Doc")
                    .table("DOC")
                    .key("id")
                    .abstract_type()
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
                    .node(NodeType::value("kind", SemanticType::String, ColumnSpec::new("KIND", JdbcType::Varchar)))
                    .node(NodeType::to_many("pages", RelationKind::Owns, "Page", "doc")),
            )
            .entity_type(
                EntityTypeSpec::new("Memo")
                    .extends("Doc")
                    .node(NodeType::value("kind", SemanticType::String, ColumnSpec::new("KIND", JdbcType::Varchar)).fixed_value("M"))
                    .node(NodeType::value("to", SemanticType::String, ColumnSpec::new("RECIPIENT", JdbcType::Varchar))),
            )
            .entity_type(
                EntityTypeSpec::new("Page")
                    .table("PAGE")
                    .key("id")
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
                    .node(NodeType::reference(
                        "doc",
                        SemanticType::Long,
                        ColumnSpec::new("DOC_ID", JdbcType::BigInt),
                        RelationKind::Refers,
                        "Doc",
                    )),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn fresh_entity_has_nulls_and_fixed_values() {
        let defs = definitions();
        let memo = Entity::new(defs.entity_type("Memo").unwrap(), EntityState::NotInDb, true);
        assert_eq!(memo.value("kind"), Some(&Value::from("M")));
        assert_eq!(memo.value("to"), Some(&Value::Null));
        assert_eq!(memo.key(), None);
        assert!(memo.to_many("pages").unwrap().is_fetched());
    }

    #[test]
    fn upgrade_keeps_inherited_slots() {
        let defs = definitions();
        let mut doc = Entity::new(defs.entity_type("Doc").unwrap(), EntityState::Loading, false);
        *doc.scalar_mut(0).unwrap() = NodeValue::Loaded(Value::Long(7));
        doc.upgrade_type(defs.entity_type("Memo").unwrap());
        assert_eq!(doc.type_name(), "Memo");
        assert_eq!(doc.key(), Some(&Value::Long(7)));
        assert_eq!(doc.nodes().len(), 4);
        assert_eq!(doc.value("to"), None);
    }

    #[test]
    fn reset_keeps_key() {
        let defs = definitions();
        let mut page = Entity::new(defs.entity_type("Page").unwrap(), EntityState::NotInDb, true);
        *page.scalar_mut(0).unwrap() = NodeValue::Loaded(Value::Long(3));
        page.reset_nodes();
        assert_eq!(page.key(), Some(&Value::Long(3)));
        assert_eq!(page.value("doc"), None);
    }
}
