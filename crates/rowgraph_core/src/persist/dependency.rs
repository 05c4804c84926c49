//! Foreign key ordering of persist groups.

use crate::entity::{EntityContext, EntityId, Node};
use crate::error::{CoreError, CoreResult};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Which way foreign keys constrain the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Referenced rows first. Used for inserts, updates and snapshot loads.
    Insert,
    /// Referencing rows first.
    Delete,
}

/// A total order of entities consistent with their references.
///
/// Entities are released in rounds: each round takes every remaining
/// entity whose dependencies are all ordered, in input order. References
/// to entities outside the set are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTree {
    order: Vec<EntityId>,
}

impl DependencyTree {
    /// Orders `entities` by the resolved references between them.
    ///
    /// # Errors
    ///
    /// Returns `DependencyCycle` if the references form a cycle, and an
    /// error if an entity is not in the context.
    pub fn build(ctx: &EntityContext, entities: &[EntityId], direction: Direction) -> CoreResult<Self> {
        let members: HashSet<EntityId> = entities.iter().copied().collect();
        let mut edges = Vec::new();
        for &id in entities {
            for node in ctx.entity(id)?.nodes() {
                if let Node::Ref(r) = node {
                    match r.reference() {
                        Some(target) if target != id && members.contains(&target) => {
                            edges.push((id, target));
                        }
                        _ => {}
                    }
                }
            }
        }
        Self::from_edges(entities, &edges, direction)
    }

    /// Orders `entities` given `(referencing, referenced)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `DependencyCycle` if the edges form a cycle.
    pub fn from_edges(
        entities: &[EntityId],
        edges: &[(EntityId, EntityId)],
        direction: Direction,
    ) -> CoreResult<Self> {
        let mut depends: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        for &(from, to) in edges {
            let (node, dependency) = match direction {
                Direction::Insert => (from, to),
                Direction::Delete => (to, from),
            };
            depends.entry(node).or_default().push(dependency);
        }

        let mut visited: HashSet<EntityId> = HashSet::with_capacity(entities.len());
        let mut remaining: Vec<EntityId> = Vec::with_capacity(entities.len());
        for id in entities {
            if !remaining.contains(id) {
                remaining.push(*id);
            }
        }
        let mut order = Vec::with_capacity(remaining.len());
        let mut rounds = 0usize;

        while !remaining.is_empty() {
            let ready: Vec<EntityId> = remaining
                .iter()
                .copied()
                .filter(|id| {
                    depends
                        .get(id)
                        .map_or(true, |deps| deps.iter().all(|d| visited.contains(d)))
                })
                .collect();
            if ready.is_empty() {
                return Err(CoreError::DependencyCycle {
                    remaining: remaining.len(),
                });
            }
            visited.extend(ready.iter().copied());
            remaining.retain(|id| !visited.contains(id));
            order.extend(ready);
            rounds += 1;
        }
        trace!(entities = order.len(), rounds, ?direction, "dependency order built");
        Ok(Self { order })
    }

    /// Returns the ordered entities.
    #[must_use]
    pub fn order(&self) -> &[EntityId] {
        &self.order
    }

    /// Consumes the tree, returning the order.
    #[must_use]
    pub fn into_order(self) -> Vec<EntityId> {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: usize) -> Vec<EntityId> {
        (0..n).map(|_| EntityId::new()).collect()
    }

    fn position(order: &[EntityId], id: EntityId) -> usize {
        order.iter().position(|e| *e == id).unwrap()
    }

    #[test]
    fn referenced_first_on_insert() {
        let e = ids(3);
        // e0 -> e1 -> e2
        let edges = [(e[0], e[1]), (e[1], e[2])];
        let tree = DependencyTree::from_edges(&e, &edges, Direction::Insert).unwrap();
        assert_eq!(tree.order(), &[e[2], e[1], e[0]]);
    }

    #[test]
    fn referencing_first_on_delete() {
        let e = ids(3);
        let edges = [(e[0], e[1]), (e[1], e[2])];
        let tree = DependencyTree::from_edges(&e, &edges, Direction::Delete).unwrap();
        assert_eq!(tree.into_order(), vec![e[0], e[1], e[2]]);
    }

    #[test]
    fn independent_entities_keep_input_order() {
        let e = ids(4);
        let tree = DependencyTree::from_edges(&e, &[], Direction::Insert).unwrap();
        assert_eq!(tree.order(), e.as_slice());
    }

    #[test]
    fn cycle_is_reported() {
        let e = ids(3);
        let edges = [(e[0], e[1]), (e[1], e[0])];
        let err = DependencyTree::from_edges(&e, &edges, Direction::Insert).unwrap_err();
        assert!(matches!(err, CoreError::DependencyCycle { remaining: 2 }));
    }

    #[test]
    fn duplicates_are_ordered_once() {
        let e = ids(2);
        let input = [e[0], e[1], e[0]];
        let tree = DependencyTree::from_edges(&input, &[(e[0], e[1])], Direction::Insert).unwrap();
        assert_eq!(tree.order(), &[e[1], e[0]]);
    }

    /// A random acyclic graph: node `i` may reference any node `j < i`.
    fn dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..12).prop_flat_map(|n| {
            let edges = proptest::collection::vec((0..n, 0..n), 0..n * 2).prop_map(|pairs| {
                pairs
                    .into_iter()
                    .filter(|(a, b)| a != b)
                    .map(|(a, b)| if a > b { (a, b) } else { (b, a) })
                    .collect::<Vec<_>>()
            });
            (Just(n), edges)
        })
    }

    proptest! {
        #[test]
        fn reversed_insert_order_is_a_delete_order((n, pairs) in dag()) {
            let e = ids(n);
            let edges: Vec<(EntityId, EntityId)> = pairs.iter().map(|(a, b)| (e[*a], e[*b])).collect();

            let insert = DependencyTree::from_edges(&e, &edges, Direction::Insert).unwrap().into_order();
            let delete = DependencyTree::from_edges(&e, &edges, Direction::Delete).unwrap().into_order();
            prop_assert_eq!(insert.len(), n);
            prop_assert_eq!(delete.len(), n);

            let reversed: Vec<EntityId> = insert.iter().rev().copied().collect();
            for (from, to) in &edges {
                prop_assert!(position(&insert, *to) < position(&insert, *from));
                prop_assert!(position(&delete, *from) < position(&delete, *to));
                prop_assert!(position(&reversed, *from) < position(&reversed, *to));
            }
        }
    }
}
