//! Query execution and result loading.

mod batch;
mod loader;

pub use batch::{CompiledQuery, QueryBatch};

use crate::entity::EntityId;

/// The root entities matched by one query, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    entities: Vec<EntityId>,
}

impl QueryResult {
    pub(crate) fn new(entities: Vec<EntityId>) -> Self {
        Self { entities }
    }

    /// Returns the matched entities.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Returns the first matched entity.
    #[must_use]
    pub fn first(&self) -> Option<EntityId> {
        self.entities.first().copied()
    }

    /// Returns the number of matched entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl IntoIterator for QueryResult {
    type Item = EntityId;
    type IntoIter = std::vec::IntoIter<EntityId>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}
