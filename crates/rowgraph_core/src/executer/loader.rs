//! Turning result rows into entities.

use crate::entity::{EntityContext, EntityId, EntityState, NodeValue};
use crate::error::{CoreError, CoreResult};
use crate::executer::QueryResult;
use crate::jdbc;
use crate::model::{Definitions, EntityType};
use crate::projection::Projection;
use crate::query::{QueryObject, QueryObjectId};
use crate::types::Value;
use rowgraph_sql::{ResultSet, SqlValue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Loads the rows of one query tree into a context.
pub(crate) struct EntityLoader<'a, 'q> {
    ctx: &'a mut EntityContext,
    definitions: Arc<dyn Definitions>,
    query: &'q QueryObject,
    projection: &'a Projection,
    /// Entities populated in this pass, in first-seen order.
    populated: Vec<EntityId>,
    populated_set: HashSet<EntityId>,
    /// Entities seen per query object, in first-seen order.
    seen: HashMap<QueryObjectId, Vec<EntityId>>,
}

impl<'a, 'q> EntityLoader<'a, 'q> {
    pub(crate) fn new(ctx: &'a mut EntityContext, query: &'q QueryObject, projection: &'a Projection) -> Self {
        let definitions = Arc::clone(ctx.definitions());
        Self {
            ctx,
            definitions,
            query,
            projection,
            populated: Vec::new(),
            populated_set: HashSet::new(),
            seen: HashMap::new(),
        }
    }

    pub(crate) fn load(mut self, rows: ResultSet) -> CoreResult<QueryResult> {
        let tree = self.query.walk();
        let mut keys = Vec::with_capacity(tree.len());
        for qo in &tree {
            let ty = self.definitions.entity_type(qo.entity_type())?;
            let position = self
                .projection
                .index_of(qo.id(), ty.key_node_name())
                .ok_or_else(|| CoreError::illegal_query_state(format!("key of {} is not projected", ty.name())))?;
            keys.push((qo.id(), ty, position));
        }

        let row_count = rows.len();
        for row in rows.into_rows() {
            for (qo, ty, position) in &keys {
                self.load_row(*qo, ty, *position, &row)?;
            }
        }
        trace!(rows = row_count, entities = self.populated.len(), "result set consumed");

        self.downcast()?;
        for id in &self.populated {
            let entity = self.ctx.entity_mut(*id)?;
            entity.state = EntityState::Loaded;
            entity.constraints.must_exist_in_db = true;
            entity.constraints.must_not_exist_in_db = false;
        }
        self.resolve_references()?;
        self.check_completeness()?;
        self.refresh_collections()?;

        let roots = self.seen.remove(&self.query.id()).unwrap_or_default();
        Ok(QueryResult::new(roots))
    }

    fn load_row(&mut self, qo: QueryObjectId, ty: &Arc<EntityType>, key_position: usize, row: &[SqlValue]) -> CoreResult<()> {
        let raw = row.get(key_position).cloned().unwrap_or(SqlValue::Null);
        if raw.is_null() {
            return Ok(());
        }
        let key = jdbc::from_sql(&*self.definitions, ty.key_node(), raw)?;
        let id = self.ctx.get_or_create(ty, key);

        let seen = self.seen.entry(qo).or_default();
        if !seen.contains(&id) {
            seen.push(id);
        }
        if self.populated_set.contains(&id) || self.ctx.entity(id)?.state == EntityState::Loaded {
            return Ok(());
        }

        let entity = self.ctx.entity_mut(id)?;
        if !entity.entity_type.is_a(ty.name()) {
            if ty.is_a(entity.entity_type.name()) {
                entity.upgrade_type(Arc::clone(ty));
            } else {
                return Err(CoreError::illegal_query_state(format!(
                    "row of {} has the key of a {} already in the context",
                    ty.name(),
                    entity.type_name()
                )));
            }
        }
        entity.state = EntityState::Loading;
        entity.reset_nodes();

        for (position, column) in self.projection.columns_of(qo) {
            let node = column.node();
            let raw = row.get(position).cloned().unwrap_or(SqlValue::Null);
            let value = jdbc::from_sql(&*self.definitions, node, raw)?;
            let entity = self.ctx.entity_mut(id)?;
            let Some(index) = entity.entity_type.node_index(node.name()) else {
                continue;
            };
            if node.is_reference() {
                if let Some(slot) = entity.ref_mut(index) {
                    slot.fk = NodeValue::Loaded(value);
                    slot.reference = None;
                    slot.changed = false;
                }
            } else if let Some(slot) = entity.scalar_mut(index) {
                *slot = NodeValue::Loaded(value);
            }
        }

        self.populated_set.insert(id);
        self.populated.push(id);
        Ok(())
    }

    /// Replaces abstract types by the unique concrete subtype whose
    /// discriminators match the loaded values.
    fn downcast(&mut self) -> CoreResult<()> {
        for id in &self.populated {
            let entity = self.ctx.entity(*id)?;
            if !entity.entity_type.is_abstract() {
                continue;
            }
            let matches: Vec<Arc<EntityType>> = self
                .definitions
                .concrete_subtypes(entity.type_name())
                .into_iter()
                .filter(|candidate| {
                    candidate
                        .fixed_nodes()
                        .all(|node| entity.value(node.name()) == node.fixed())
                })
                .collect();
            if matches.len() != 1 {
                return Err(CoreError::DowncastEntity {
                    entity_type: entity.type_name().to_string(),
                    key: entity.key().cloned().unwrap_or(Value::Null),
                    matches: matches.len(),
                });
            }
            let subtype = Arc::clone(&matches[0]);
            trace!(from = entity.type_name(), to = subtype.name(), "downcast");
            self.ctx.entity_mut(*id)?.upgrade_type(subtype);
        }
        Ok(())
    }

    /// Points every loaded foreign key at its target, creating unloaded
    /// placeholders for targets that were not part of the query.
    fn resolve_references(&mut self) -> CoreResult<()> {
        for id in &self.populated {
            let entity = self.ctx.entity(*id)?;
            let mut targets = Vec::new();
            for (index, node) in entity.entity_type.nodes().iter().enumerate() {
                if !node.is_reference() {
                    continue;
                }
                let fk = entity.nodes()[index].scalar().and_then(NodeValue::value);
                if let (Some(fk), Some(target)) = (fk.filter(|v| !v.is_null()), node.target_type()) {
                    targets.push((index, target.to_string(), fk.clone()));
                }
            }
            for (index, target, fk) in targets {
                let target_type = self.definitions.entity_type(&target)?;
                let target_id = self.ctx.get_or_create(&target_type, fk);
                if let Some(slot) = self.ctx.entity_mut(*id)?.ref_mut(index) {
                    slot.reference = Some(target_id);
                }
            }
        }
        Ok(())
    }

    /// A non-null foreign key that was joined must lead to a loaded entity.
    fn check_completeness(&self) -> CoreResult<()> {
        for qo in self.query.walk() {
            let Some(ids) = self.seen.get(&qo.id()) else {
                continue;
            };
            for join in qo.joins() {
                for id in ids {
                    let entity = self.ctx.entity(*id)?;
                    let is_reference = entity
                        .entity_type
                        .node(&join.property)
                        .is_some_and(|n| n.is_reference());
                    if !is_reference {
                        continue;
                    }
                    let Some(target) = entity.reference(&join.property) else {
                        continue;
                    };
                    if self.ctx.entity(target)?.state != EntityState::Loaded {
                        return Err(CoreError::illegal_query_state(format!(
                            "{}.{} of key {} was joined but its target was not loaded",
                            entity.type_name(),
                            join.property,
                            entity.key().cloned().unwrap_or(Value::Null)
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Marks joined to-many nodes fetched and fills them from the context.
    fn refresh_collections(&mut self) -> CoreResult<()> {
        for qo in self.query.walk() {
            let Some(ids) = self.seen.get(&qo.id()) else {
                continue;
            };
            for join in qo.joins() {
                for id in ids {
                    let index = {
                        let ty = &self.ctx.entity(*id)?.entity_type;
                        match ty.node(&join.property) {
                            Some(node) if node.is_to_many() => ty.node_index(&join.property),
                            _ => None,
                        }
                    };
                    if let Some(index) = index {
                        self.ctx.refresh_to_many(*id, index)?;
                    }
                }
            }
        }
        Ok(())
    }
}
