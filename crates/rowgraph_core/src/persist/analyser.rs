//! Classifying and ordering the operations of a persist request.

use crate::entity::{EntityContext, EntityId, EntityState, Node};
use crate::error::{CoreError, CoreResult};
use crate::model::KeyGeneration;
use crate::persist::dependency::{DependencyTree, Direction};
use crate::persist::{OperationGroup, OperationType, PersistRequest};
use tracing::debug;

/// The classified and ordered groups of one persist call.
#[derive(Debug, Clone, Default)]
pub(crate) struct PersistPlan {
    pub(crate) create: OperationGroup,
    pub(crate) update: OperationGroup,
    pub(crate) delete: OperationGroup,
    pub(crate) depends_on: OperationGroup,
}

impl PersistPlan {
    fn in_any_group(&self, id: EntityId) -> bool {
        self.create.contains(id) || self.update.contains(id) || self.delete.contains(id) || self.depends_on.contains(id)
    }
}

/// Turns a request into a [`PersistPlan`].
///
/// Existence checks for ambiguous saves run in an auxiliary context on the
/// same transaction.
pub(crate) struct PersistAnalyser<'c> {
    ctx: &'c mut EntityContext,
    plan: PersistPlan,
}

impl<'c> PersistAnalyser<'c> {
    pub(crate) fn new(ctx: &'c mut EntityContext) -> Self {
        Self {
            ctx,
            plan: PersistPlan::default(),
        }
    }

    pub(crate) fn analyse(mut self, request: &PersistRequest) -> CoreResult<PersistPlan> {
        for op in request.operations() {
            let id = op.entity;
            match op.kind {
                OperationType::Insert => {
                    self.plan.create.add(id);
                }
                OperationType::Update => {
                    self.plan.update.add(id);
                }
                OperationType::Delete => {
                    self.plan.delete.add(id);
                }
                OperationType::Save => {
                    if self.exists(id)? {
                        self.plan.update.add(id);
                    } else {
                        self.plan.create.add(id);
                    }
                }
                OperationType::DependsOn => {
                    self.plan.depends_on.add(id);
                }
            }
        }

        self.cascade()?;
        self.resolve_overlaps()?;
        self.check_constraints()?;
        self.collect_dependencies()?;
        self.order()?;

        debug!(
            create = self.plan.create.len(),
            update = self.plan.update.len(),
            delete = self.plan.delete.len(),
            depends_on = self.plan.depends_on.len(),
            "persist request analysed"
        );
        Ok(self.plan)
    }

    /// Decides whether a saved entity is in the database.
    fn exists(&mut self, id: EntityId) -> CoreResult<bool> {
        let entity = self.ctx.entity(id)?;
        let constraints = entity.constraints();
        if entity.state() == EntityState::Loaded || constraints.must_exist_in_db {
            return Ok(true);
        }
        if entity.state() == EntityState::NotInDb || constraints.must_not_exist_in_db {
            return Ok(false);
        }
        if entity.key().is_none() {
            return match entity.entity_type().key_generation() {
                KeyGeneration::Framework => Ok(false),
                KeyGeneration::Client => Err(CoreError::sort_persist(format!(
                    "{} {id} has no key",
                    entity.type_name()
                ))),
            };
        }
        self.ctx.exists_in_database(id)
    }

    /// Extends the groups along owning relations.
    fn cascade(&mut self) -> CoreResult<()> {
        let mut pending: Vec<EntityId> = self.plan.create.iter().chain(self.plan.update.iter()).collect();
        while let Some(id) = pending.pop() {
            for (child, removed) in self.owned_children(id)? {
                if self.plan.in_any_group(child) {
                    continue;
                }
                let child_entity = self.ctx.entity(child)?;
                if removed {
                    if child_entity.state() != EntityState::NotInDb {
                        self.plan.delete.add(child);
                        self.cascade_delete(child)?;
                    }
                } else if child_entity.state() == EntityState::NotInDb {
                    self.plan.create.add(child);
                    pending.push(child);
                } else if child_entity.state() == EntityState::Loaded {
                    self.plan.update.add(child);
                    pending.push(child);
                }
            }
        }

        let deleted: Vec<EntityId> = self.plan.delete.iter().collect();
        for id in deleted {
            self.cascade_delete(id)?;
        }
        Ok(())
    }

    /// Deletes everything a deleted entity owns.
    fn cascade_delete(&mut self, id: EntityId) -> CoreResult<()> {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            self.fetch_owned_collections(id)?;
            for (child, _) in self.owned_children(id)? {
                if self.ctx.entity(child)?.state() == EntityState::NotInDb {
                    continue;
                }
                if self.plan.delete.add(child) {
                    pending.push(child);
                }
            }
        }
        Ok(())
    }

    fn fetch_owned_collections(&mut self, id: EntityId) -> CoreResult<()> {
        let entity = self.ctx.entity(id)?;
        if entity.state() == EntityState::NotInDb || entity.key().is_none() {
            return Ok(());
        }
        let unfetched: Vec<String> = entity
            .entity_type()
            .nodes()
            .iter()
            .filter(|n| n.is_to_many() && n.owns())
            .filter(|n| !entity.to_many(n.name()).is_some_and(|m| m.is_fetched()))
            .map(|n| n.name().to_string())
            .collect();
        for node in unfetched {
            self.ctx.fetch(id, &node)?;
        }
        Ok(())
    }

    /// Returns the owned children of an entity, flagging members removed
    /// from an owning collection.
    fn owned_children(&self, id: EntityId) -> CoreResult<Vec<(EntityId, bool)>> {
        let entity = self.ctx.entity(id)?;
        let mut children = Vec::new();
        for (node_type, slot) in entity.entity_type().nodes().iter().zip(entity.nodes()) {
            if !node_type.owns() {
                continue;
            }
            match slot {
                Node::ToMany(many) => {
                    children.extend(many.entities().iter().map(|c| (*c, false)));
                    for removed in many.removed() {
                        // a member moved to another owner stays alive
                        let back = node_type.relation().and_then(|r| r.back_reference.as_deref());
                        let moved = back
                            .and_then(|b| self.ctx.get(*removed).and_then(|c| c.reference(b)))
                            .is_some();
                        if !moved {
                            children.push((*removed, true));
                        }
                    }
                }
                Node::Ref(r) => children.extend(r.reference().map(|c| (c, false))),
                Node::Value(_) => {}
            }
        }
        Ok(children)
    }

    /// Creation and deletion win over updates of the same entity.
    fn resolve_overlaps(&mut self) -> CoreResult<()> {
        if let Some(id) = self.plan.create.iter().find(|id| self.plan.delete.contains(*id)) {
            return Err(CoreError::sort_persist(format!(
                "entity {id} is both created and deleted"
            )));
        }
        let (create, delete) = (&self.plan.create, &self.plan.delete);
        self.plan
            .update
            .retain(|id| !create.contains(id) && !delete.contains(id));
        let (create, update, delete) = (&self.plan.create, &self.plan.update, &self.plan.delete);
        self.plan
            .depends_on
            .retain(|id| !create.contains(id) && !update.contains(id) && !delete.contains(id));
        Ok(())
    }

    fn check_constraints(&self) -> CoreResult<()> {
        for id in self.plan.create.iter() {
            let entity = self.ctx.entity(id)?;
            if entity.constraints().must_exist_in_db || entity.state() == EntityState::Loaded {
                return Err(CoreError::sort_persist(format!(
                    "{} {id} must exist in the database and cannot be created",
                    entity.type_name()
                )));
            }
        }
        for id in self.plan.update.iter().chain(self.plan.delete.iter()).chain(self.plan.depends_on.iter()) {
            let entity = self.ctx.entity(id)?;
            if entity.constraints().must_not_exist_in_db || entity.state() == EntityState::NotInDb {
                return Err(CoreError::sort_persist(format!(
                    "{} {id} is not in the database",
                    entity.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Requires every entity referenced by a written row to exist.
    fn collect_dependencies(&mut self) -> CoreResult<()> {
        let writers: Vec<EntityId> = self.plan.create.iter().chain(self.plan.update.iter()).collect();
        for id in writers {
            let targets: Vec<EntityId> = self
                .ctx
                .entity(id)?
                .nodes()
                .iter()
                .filter_map(|n| match n {
                    Node::Ref(r) => r.reference(),
                    _ => None,
                })
                .collect();
            for target in targets {
                if self.plan.in_any_group(target) {
                    continue;
                }
                let entity = self.ctx.entity(target)?;
                if entity.state() == EntityState::NotInDb {
                    return Err(CoreError::sort_persist(format!(
                        "{id} references {} {target} which is neither in the database nor being created",
                        entity.type_name()
                    )));
                }
                self.plan.depends_on.add(target);
            }
        }
        Ok(())
    }

    fn order(&mut self) -> CoreResult<()> {
        for (group, direction) in [
            (&mut self.plan.create, Direction::Insert),
            (&mut self.plan.update, Direction::Insert),
            (&mut self.plan.depends_on, Direction::Insert),
            (&mut self.plan.delete, Direction::Delete),
        ] {
            let tree = DependencyTree::build(&*self.ctx, group.entities(), direction)?;
            group.reorder(tree.order());
        }
        Ok(())
    }
}
