//! Persist operations and requests.

use crate::entity::EntityId;
use serde::Serialize;
use std::fmt;

/// What a persist call should do with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Insert a new row.
    Insert,
    /// Update an existing row.
    Update,
    /// Delete an existing row.
    Delete,
    /// Insert or update, decided by whether the row exists.
    Save,
    /// Write nothing, but require the row to exist unchanged.
    DependsOn,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Save => "save",
            Self::DependsOn => "depends-on",
        };
        f.write_str(name)
    }
}

/// One entity and what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    /// The entity.
    pub entity: EntityId,
    /// The requested operation.
    pub kind: OperationType,
}

impl Operation {
    /// Creates an operation.
    #[must_use]
    pub const fn new(entity: EntityId, kind: OperationType) -> Self {
        Self { entity, kind }
    }
}

/// The operations of one persist call.
///
/// ```rust
/// use rowgraph_core::entity::EntityId;
/// use rowgraph_core::persist::{OperationType, PersistRequest};
///
/// let (a, b) = (EntityId::new(), EntityId::new());
/// let request = PersistRequest::new().save(a).delete(b);
/// assert_eq!(request.len(), 2);
/// assert_eq!(request.operations()[1].kind, OperationType::Delete);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistRequest {
    operations: Vec<Operation>,
}

impl PersistRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an insert.
    #[must_use]
    pub fn insert(self, entity: EntityId) -> Self {
        self.with(entity, OperationType::Insert)
    }

    /// Adds an update.
    #[must_use]
    pub fn update(self, entity: EntityId) -> Self {
        self.with(entity, OperationType::Update)
    }

    /// Adds a delete.
    #[must_use]
    pub fn delete(self, entity: EntityId) -> Self {
        self.with(entity, OperationType::Delete)
    }

    /// Adds an insert-or-update.
    #[must_use]
    pub fn save(self, entity: EntityId) -> Self {
        self.with(entity, OperationType::Save)
    }

    /// Adds an existence requirement.
    #[must_use]
    pub fn depends_on(self, entity: EntityId) -> Self {
        self.with(entity, OperationType::DependsOn)
    }

    /// Adds an operation.
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Returns the operations in request order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn with(mut self, entity: EntityId, kind: OperationType) -> Self {
        self.push(Operation::new(entity, kind));
        self
    }
}

impl FromIterator<Operation> for PersistRequest {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_request_order() {
        let ids: Vec<EntityId> = (0..3).map(|_| EntityId::new()).collect();
        let request = PersistRequest::new().insert(ids[0]).depends_on(ids[1]).update(ids[2]);
        let kinds: Vec<OperationType> = request.operations().iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![OperationType::Insert, OperationType::DependsOn, OperationType::Update]
        );
        assert_eq!(request.operations()[1].entity, ids[1]);
    }

    #[test]
    fn collect_from_operations() {
        let id = EntityId::new();
        let request: PersistRequest = [Operation::new(id, OperationType::Save)].into_iter().collect();
        assert_eq!(request.len(), 1);
        assert!(!request.is_empty());
    }

    #[test]
    fn display_and_serialize() {
        assert_eq!(OperationType::DependsOn.to_string(), "depends-on");
        assert_eq!(
            serde_json::to_string(&OperationType::DependsOn).unwrap(),
            "\"depends_on\""
        );
    }
}
