//! Audit trail of a persist call.

use crate::entity::{Entity, EntityId, Node};
use crate::persist::OperationType;
use crate::types::Value;
use serde::Serialize;

/// One changed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Node name.
    pub node: String,
    /// Value before the persist; null for inserts.
    pub old: Value,
    /// Value after the persist; null for deletes.
    pub new: Value,
}

/// The changes written for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// The entity.
    pub entity: EntityId,
    /// Its entity type.
    pub entity_type: String,
    /// Its primary key.
    pub key: Value,
    /// Insert, update or delete.
    pub operation: OperationType,
    /// Changed nodes, in node order, with the lock stamp last.
    pub changes: Vec<Change>,
}

impl AuditRecord {
    /// Returns the change of a node, if any.
    #[must_use]
    pub fn change(&self, node: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.node == node)
    }
}

/// Every audit record of a persist call, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditInformation {
    records: Vec<AuditRecord>,
}

impl AuditInformation {
    pub(crate) fn new(records: Vec<AuditRecord>) -> Self {
        Self { records }
    }

    /// Returns the records.
    #[must_use]
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Returns the record of an entity.
    #[must_use]
    pub fn record(&self, entity: EntityId) -> Option<&AuditRecord> {
        self.records.iter().find(|r| r.entity == entity)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing was audited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Every non-null column value of a new entity, as a change from null.
pub(crate) fn creation_changes(entity: &Entity) -> Vec<Change> {
    column_values(entity)
        .filter(|(_, v)| !v.is_null())
        .map(|(node, v)| Change {
            node,
            old: Value::Null,
            new: v,
        })
        .collect()
}

/// The loaded column values of `entity` that differ from `snapshot`.
///
/// Unloaded nodes and the optimistic lock never count as changes.
pub(crate) fn update_changes(entity: &Entity, snapshot: &Entity) -> Vec<Change> {
    column_values(entity)
        .filter_map(|(node, new)| {
            let old = snapshot.value(&node).cloned().unwrap_or(Value::Null);
            (old != new).then_some(Change { node, old, new })
        })
        .collect()
}

/// Every non-null column value of a deleted row, as a change to null.
pub(crate) fn deletion_changes(row: &Entity) -> Vec<Change> {
    column_values(row)
        .filter(|(_, v)| !v.is_null())
        .map(|(node, v)| Change {
            node,
            old: v,
            new: Value::Null,
        })
        .collect()
}

fn column_values(entity: &Entity) -> impl Iterator<Item = (String, Value)> + '_ {
    entity
        .entity_type()
        .nodes()
        .iter()
        .zip(entity.nodes())
        .filter(|(node_type, _)| node_type.column().is_some() && !node_type.is_optimistic_lock())
        .filter_map(|(node_type, slot)| {
            let value = match slot {
                Node::Value(_) | Node::Ref(_) => slot.scalar()?.value()?.clone(),
                Node::ToMany(_) => return None,
            };
            Some((node_type.name().to_string(), value))
        })
}
