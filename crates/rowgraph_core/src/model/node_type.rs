//! Node (attribute) metadata.

use crate::types::Value;
use rowgraph_sql::JdbcType;
use std::sync::Arc;

/// How an entity relates to the entity a node points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The target's lifecycle belongs to this entity.
    Owns,
    /// Plain reference.
    Refers,
    /// This entity cannot exist without the target.
    DependsOn,
}

/// Relation descriptor of a reference or to-many node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Relation kind.
    pub kind: RelationKind,
    /// Name of the target entity type.
    pub target_type: String,
    /// For to-many nodes, the reference node on the target pointing back.
    pub back_reference: Option<String>,
    /// For to-many nodes, the target node the collection is sorted by.
    pub sort_node: Option<String>,
}

/// Physical column mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Declared JDBC type.
    pub jdbc_type: JdbcType,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
}

impl ColumnSpec {
    /// Creates a nullable column mapping.
    pub fn new(name: impl Into<String>, jdbc_type: JdbcType) -> Self {
        Self {
            name: name.into(),
            jdbc_type,
            nullable: true,
        }
    }

    /// Marks the column `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// An enumeration whose variants are stored by ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    /// Creates an enum type from its variant names, in ordinal order.
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the enum name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the variant names in ordinal order.
    #[must_use]
    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Returns the ordinal of a variant.
    #[must_use]
    pub fn ordinal_of(&self, variant: &str) -> Option<usize> {
        self.variants.iter().position(|v| v == variant)
    }

    /// Returns the variant at `ordinal`.
    #[must_use]
    pub fn variant(&self, ordinal: usize) -> Option<&str> {
        self.variants.get(ordinal).map(String::as_str)
    }
}

/// The value type a node holds in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType {
    /// Exact decimal.
    Decimal,
    /// Boolean.
    Boolean,
    /// Enumeration stored by ordinal.
    Enum(Arc<EnumType>),
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Calendar date.
    SqlDate,
    /// Date and time.
    UtilDate,
    /// Text.
    String,
    /// UUID.
    Uuid,
    /// Binary data.
    Bytes,
}

/// Metadata for one mapped attribute of an entity type.
///
/// A node is exactly one of:
/// - a value node: column, no relation
/// - a reference node: column holding the foreign key, plus a relation
/// - a to-many node: relation with a back reference, no column
#[derive(Debug, Clone, PartialEq)]
pub struct NodeType {
    name: String,
    semantic_type: SemanticType,
    column: Option<ColumnSpec>,
    relation: Option<RelationSpec>,
    optimistic_lock: bool,
    fixed_value: Option<Value>,
    type_converter: Option<String>,
}

impl NodeType {
    /// Creates a column-mapped value node.
    pub fn value(name: impl Into<String>, semantic_type: SemanticType, column: ColumnSpec) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            column: Some(column),
            relation: None,
            optimistic_lock: false,
            fixed_value: None,
            type_converter: None,
        }
    }

    /// Creates a foreign-key reference node.
    ///
    /// `semantic_type` is the type of the foreign key, which matches the
    /// target's key node.
    pub fn reference(
        name: impl Into<String>,
        semantic_type: SemanticType,
        column: ColumnSpec,
        kind: RelationKind,
        target_type: impl Into<String>,
    ) -> Self {
        Self {
            relation: Some(RelationSpec {
                kind,
                target_type: target_type.into(),
                back_reference: None,
                sort_node: None,
            }),
            ..Self::value(name, semantic_type, column)
        }
    }

    /// Creates a to-many node backed by a reference node on the target.
    pub fn to_many(
        name: impl Into<String>,
        kind: RelationKind,
        target_type: impl Into<String>,
        back_reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            semantic_type: SemanticType::Long,
            column: None,
            relation: Some(RelationSpec {
                kind,
                target_type: target_type.into(),
                back_reference: Some(back_reference.into()),
                sort_node: None,
            }),
            optimistic_lock: false,
            fixed_value: None,
            type_converter: None,
        }
    }

    /// Marks the node as the optimistic lock of its entity type.
    #[must_use]
    pub fn optimistic_lock(mut self) -> Self {
        self.optimistic_lock = true;
        self
    }

    /// Sets the discriminator value that identifies the declaring subtype.
    #[must_use]
    pub fn fixed_value(mut self, value: impl Into<Value>) -> Self {
        self.fixed_value = Some(value.into());
        self
    }

    /// Sets the identifier of the custom converter for this node.
    #[must_use]
    pub fn converter(mut self, id: impl Into<String>) -> Self {
        self.type_converter = Some(id.into());
        self
    }

    /// Sorts a to-many collection by a node of the target type.
    #[must_use]
    pub fn sort_by(mut self, node: impl Into<String>) -> Self {
        if let Some(relation) = &mut self.relation {
            relation.sort_node = Some(node.into());
        }
        self
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the semantic type.
    #[must_use]
    pub fn semantic_type(&self) -> &SemanticType {
        &self.semantic_type
    }

    /// Returns the column mapping, if any.
    #[must_use]
    pub fn column(&self) -> Option<&ColumnSpec> {
        self.column.as_ref()
    }

    /// Returns the column name, if any.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        self.column.as_ref().map(|c| c.name.as_str())
    }

    /// Returns the JDBC type of the column, if any.
    #[must_use]
    pub fn jdbc_type(&self) -> Option<JdbcType> {
        self.column.as_ref().map(|c| c.jdbc_type)
    }

    /// Returns the relation descriptor, if any.
    #[must_use]
    pub fn relation(&self) -> Option<&RelationSpec> {
        self.relation.as_ref()
    }

    /// Returns `true` for the optimistic lock node.
    #[must_use]
    pub const fn is_optimistic_lock(&self) -> bool {
        self.optimistic_lock
    }

    /// Returns the discriminator value, if any.
    #[must_use]
    pub fn fixed(&self) -> Option<&Value> {
        self.fixed_value.as_ref()
    }

    /// Returns the converter identifier, if any.
    #[must_use]
    pub fn type_converter(&self) -> Option<&str> {
        self.type_converter.as_deref()
    }

    /// Returns `true` for a foreign-key reference node.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        self.relation.is_some() && self.column.is_some()
    }

    /// Returns `true` for a to-many node.
    #[must_use]
    pub fn is_to_many(&self) -> bool {
        self.column.is_none()
            && self
                .relation
                .as_ref()
                .is_some_and(|r| r.back_reference.is_some())
    }

    /// Returns `true` if the node's relation is [`RelationKind::Owns`].
    #[must_use]
    pub fn owns(&self) -> bool {
        self.relation
            .as_ref()
            .is_some_and(|r| r.kind == RelationKind::Owns)
    }

    /// Returns the relation target type name, if any.
    #[must_use]
    pub fn target_type(&self) -> Option<&str> {
        self.relation.as_ref().map(|r| r.target_type.as_str())
    }
}
