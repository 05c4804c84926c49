//! Ordered, duplicate-free groups of entities.

use crate::entity::EntityId;
use std::collections::HashSet;

/// The entities receiving one kind of operation, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationGroup {
    order: Vec<EntityId>,
    members: HashSet<EntityId>,
}

impl OperationGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entity. Returns `false` if it was already a member.
    pub fn add(&mut self, entity: EntityId) -> bool {
        if self.members.insert(entity) {
            self.order.push(entity);
            true
        } else {
            false
        }
    }

    /// Removes an entity. Returns `false` if it was not a member.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        if self.members.remove(&entity) {
            self.order.retain(|e| *e != entity);
            true
        } else {
            false
        }
    }

    /// Returns `true` if the entity is a member.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }

    /// Keeps only the members for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(EntityId) -> bool) {
        let members = &mut self.members;
        self.order.retain(|e| {
            let kept = keep(*e);
            if !kept {
                members.remove(e);
            }
            kept
        });
    }

    /// Replaces the execution order.
    ///
    /// `order` must hold exactly the current members; entities it misses
    /// keep their relative order at the end.
    pub fn reorder(&mut self, order: &[EntityId]) {
        let mut next: Vec<EntityId> = Vec::with_capacity(self.order.len());
        let mut placed = HashSet::with_capacity(self.order.len());
        for e in order {
            if self.members.contains(e) && placed.insert(*e) {
                next.push(*e);
            }
        }
        next.extend(self.order.iter().filter(|e| !placed.contains(*e)));
        self.order = next;
    }

    /// Returns the members in order.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.order
    }

    /// Iterates over the members in order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().copied()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
