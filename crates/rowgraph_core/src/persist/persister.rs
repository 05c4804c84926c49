//! The persist pipeline.
//!
//! One call runs, in order: analyse, assign keys, load and validate,
//! audit, filter, stamp locks, verify rights, insert, update, delete,
//! audit commit and post-process. Any failure rolls the transaction back.
//! Entity states and lock values change only after a successful commit;
//! keys issued by the sequence generator are kept.

use crate::config::PessimisticValidation;
use crate::entity::{Entity, EntityContext, EntityId, EntityState, Node, NodeValue, SharedConnection};
use crate::environment::Environment;
use crate::error::{CoreError, CoreResult};
use crate::jdbc;
use crate::model::{EntityType, KeyGeneration, NodeType, SemanticType};
use crate::persist::analyser::{PersistAnalyser, PersistPlan};
use crate::persist::dependency::{DependencyTree, Direction};
use crate::persist::audit::{creation_changes, deletion_changes, update_changes};
use crate::persist::{AuditInformation, AuditRecord, Change, OperationGroup, OperationType, PersistRequest};
use crate::query::{Condition, QueryObject};
use crate::statement::{Bind, DmlKind, PreparedDml};
use crate::types::Value;
use rowgraph_sql::{LockMode, SqlError, SqlValue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a persist call wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistResult {
    inserted: usize,
    updated: usize,
    deleted: usize,
    audit: AuditInformation,
}

impl PersistResult {
    /// Returns the number of inserted rows.
    #[must_use]
    pub const fn inserted(&self) -> usize {
        self.inserted
    }

    /// Returns the number of updated rows.
    #[must_use]
    pub const fn updated(&self) -> usize {
        self.updated
    }

    /// Returns the number of deleted rows.
    #[must_use]
    pub const fn deleted(&self) -> usize {
        self.deleted
    }

    /// Returns the number of executed DML rows.
    #[must_use]
    pub const fn statements(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    /// Returns the audit trail.
    #[must_use]
    pub fn audit(&self) -> &AuditInformation {
        &self.audit
    }
}

/// Writes the pending changes of an [`EntityContext`].
pub struct Persister<'c> {
    ctx: &'c mut EntityContext,
    env: Environment,
}

impl<'c> Persister<'c> {
    /// Creates a persister for a context.
    pub fn new(ctx: &'c mut EntityContext) -> Self {
        let env = ctx.environment().clone();
        Self { ctx, env }
    }

    /// Runs the pipeline for a request.
    ///
    /// In autocommit mode the call runs in its own transaction. Otherwise
    /// it joins the context's transaction, which is rolled back on failure.
    ///
    /// # Errors
    ///
    /// Returns `SortPersist` and `DependencyCycle` for inconsistent
    /// requests, the concurrency errors when the database disagrees with
    /// the entities, `AccessDenied` from the rights checker, and driver
    /// errors.
    pub fn persist(mut self, request: PersistRequest) -> CoreResult<PersistResult> {
        if request.is_empty() {
            return Ok(PersistResult::default());
        }
        match self.run(&request) {
            Ok(result) => {
                self.ctx.release_connection();
                info!(
                    inserted = result.inserted,
                    updated = result.updated,
                    deleted = result.deleted,
                    "persisted"
                );
                Ok(result)
            }
            Err(err) => {
                if self.ctx.in_transaction() {
                    if let Err(rollback) = self.ctx.rollback() {
                        warn!(error = %rollback, "rollback after failed persist failed");
                    }
                }
                self.ctx.release_connection();
                debug!(error = %err, "persist failed");
                Err(err)
            }
        }
    }

    fn run(&mut self, request: &PersistRequest) -> CoreResult<PersistResult> {
        let conn = self.ctx.connection()?;
        let began = {
            let mut guard = conn.lock();
            if guard.in_transaction() {
                false
            } else {
                guard.begin()?;
                true
            }
        };

        let mut plan = PersistAnalyser::new(&mut *self.ctx).analyse(request)?;
        self.assign_keys(&plan.create, &conn)?;
        let written: Vec<EntityId> = plan.create.iter().chain(plan.update.iter()).collect();
        self.ctx.sync_foreign_keys(&written)?;

        let snapshot = Snapshot::load(&mut *self.ctx, &plan, validation_lock(&self.env))?;
        let mut records = self.audit(&plan, &snapshot)?;

        let requested_updates: Vec<EntityId> = plan.update.iter().collect();
        let required = UpdateFilter::new(&*self.ctx, &plan, &records).required()?;
        plan.update.retain(|id| required.contains(&id));
        debug!(
            requested = requested_updates.len(),
            required = plan.update.len(),
            "updates filtered"
        );

        let stamp = LockStamp::compute(&*self.ctx, &plan, &snapshot)?;
        self.stamp_audit(&plan, &stamp, &mut records)?;
        self.verify_rights(&plan)?;

        let inserted = self.write(DmlKind::Insert, &plan.create, &snapshot, &stamp, &conn)?;
        let updated = self.write(DmlKind::Update, &plan.update, &snapshot, &stamp, &conn)?;
        let deleted = self.write(DmlKind::Delete, &plan.delete, &snapshot, &stamp, &conn)?;
        drop(snapshot);

        let audit = collect_audit(&plan, records);
        if self.env.config().audit_enabled && !audit.is_empty() {
            self.env.plugins().auditor.audit(&audit)?;
        }
        if began {
            conn.lock().commit()?;
        }

        self.post_process(&plan, &requested_updates, &stamp)?;
        Ok(PersistResult {
            inserted,
            updated,
            deleted,
            audit,
        })
    }

    /// Issues keys for new entities of framework-keyed types.
    fn assign_keys(&mut self, create: &OperationGroup, conn: &SharedConnection) -> CoreResult<()> {
        for id in create.iter() {
            let entity = self.ctx.entity(id)?;
            if entity.key().is_some() {
                continue;
            }
            let ty = Arc::clone(entity.entity_type());
            if ty.key_generation() == KeyGeneration::Client {
                return Err(CoreError::sort_persist(format!(
                    "{} {id} has no key and its type does not generate keys",
                    ty.name()
                )));
            }
            let key = {
                let mut guard = conn.lock();
                self.env.plugins().sequence_generator.next_key(&ty, &mut **guard)?
            };
            let index = ty
                .node_index(ty.key_node_name())
                .ok_or_else(|| CoreError::configuration(format!("'{}' has no key node", ty.name())))?;
            if let Some(slot) = self.ctx.entity_mut(id)?.scalar_mut(index) {
                *slot = NodeValue::Loaded(key);
            }
            self.ctx.register_key(id)?;
        }
        Ok(())
    }

    fn audit(&self, plan: &PersistPlan, snapshot: &Snapshot) -> CoreResult<HashMap<EntityId, AuditRecord>> {
        let mut records = HashMap::new();
        for id in plan.create.iter() {
            let entity = self.ctx.entity(id)?;
            records.insert(id, record(entity, OperationType::Insert, creation_changes(entity)));
        }
        for id in plan.update.iter() {
            let entity = self.ctx.entity(id)?;
            let changes = match snapshot.row(id) {
                Some(row) => update_changes(entity, row),
                None => Vec::new(),
            };
            records.insert(id, record(entity, OperationType::Update, changes));
        }
        for id in plan.delete.iter() {
            let entity = self.ctx.entity(id)?;
            let changes = deletion_changes(snapshot.row(id).unwrap_or(entity));
            records.insert(id, record(entity, OperationType::Delete, changes));
        }
        Ok(records)
    }

    /// Records the lock stamp of every written entity as a change.
    fn stamp_audit(
        &self,
        plan: &PersistPlan,
        stamp: &LockStamp,
        records: &mut HashMap<EntityId, AuditRecord>,
    ) -> CoreResult<()> {
        for id in plan.create.iter().chain(plan.update.iter()) {
            let entity = self.ctx.entity(id)?;
            let Some(lock) = entity.entity_type().lock_node() else {
                continue;
            };
            let new = stamp.value_for(lock)?;
            let old = entity.lock_value().cloned().unwrap_or(Value::Null);
            if let Some(record) = records.get_mut(&id) {
                record.changes.push(Change {
                    node: lock.name().to_string(),
                    old,
                    new,
                });
            }
        }
        Ok(())
    }

    fn verify_rights(&self, plan: &PersistPlan) -> CoreResult<()> {
        let checker = &self.env.plugins().access_rights;
        for id in plan.create.iter() {
            checker.verify_create_rights(self.ctx.entity(id)?)?;
        }
        for id in plan.update.iter() {
            checker.verify_update_rights(self.ctx.entity(id)?)?;
        }
        for id in plan.delete.iter() {
            checker.verify_delete_rights(self.ctx.entity(id)?)?;
        }
        Ok(())
    }

    /// Executes one group, batching consecutive entities of the same type.
    fn write(
        &mut self,
        kind: DmlKind,
        group: &OperationGroup,
        snapshot: &Snapshot,
        stamp: &LockStamp,
        conn: &SharedConnection,
    ) -> CoreResult<usize> {
        let entities = group.entities();
        let mut start = 0;
        while start < entities.len() {
            let ty = Arc::clone(self.ctx.entity(entities[start])?.entity_type());
            let mut end = start + 1;
            while end < entities.len() && self.ctx.entity(entities[end])?.type_name() == ty.name() {
                end += 1;
            }
            let run = &entities[start..end];
            let statement = self.env.statement(&ty, kind);
            let rows = run
                .iter()
                .map(|id| self.bind(*id, &statement, snapshot, stamp))
                .collect::<CoreResult<Vec<_>>>()?;

            let outcome = conn.lock().execute_batch(&statement.sql, &rows);
            match outcome {
                Ok(counts) => {
                    if let Some(index) = counts.iter().position(|c| *c == Some(0)) {
                        return Err(self.diagnose(kind, run[index], snapshot, None));
                    }
                }
                Err(err) => {
                    return Err(match err.batch_index().and_then(|i| run.get(i)) {
                        Some(id) => self.diagnose(kind, *id, snapshot, Some(err)),
                        None => err.into(),
                    });
                }
            }
            debug!(?kind, entity_type = ty.name(), rows = run.len(), "batch executed");
            start = end;
        }
        Ok(entities.len())
    }

    fn bind(
        &self,
        id: EntityId,
        statement: &PreparedDml,
        snapshot: &Snapshot,
        stamp: &LockStamp,
    ) -> CoreResult<Vec<SqlValue>> {
        let definitions = &**self.ctx.definitions();
        let entity = self.ctx.entity(id)?;
        let ty = entity.entity_type();
        let row = snapshot.row(id);
        let lock = ty.lock_node();

        statement
            .binds
            .iter()
            .map(|bind| match bind {
                Bind::Value(index) => {
                    let node = &ty.nodes()[*index];
                    let value = match entity.nodes()[*index].scalar() {
                        Some(NodeValue::Loaded(v)) => v.clone(),
                        _ => row
                            .and_then(|r| r.value(node.name()))
                            .cloned()
                            .unwrap_or(Value::Null),
                    };
                    jdbc::to_sql(definitions, node, &value)
                }
                Bind::NewLock => {
                    let node = lock.ok_or_else(|| missing_lock(ty))?;
                    jdbc::to_sql(definitions, node, &stamp.value_for(node)?)
                }
                Bind::OldKey => {
                    let key = entity.key().cloned().unwrap_or(Value::Null);
                    jdbc::to_sql(definitions, ty.key_node(), &key)
                }
                Bind::OldLock => {
                    let node = lock.ok_or_else(|| missing_lock(ty))?;
                    let old = row
                        .and_then(Entity::lock_value)
                        .or_else(|| entity.lock_value())
                        .cloned()
                        .unwrap_or(Value::Null);
                    jdbc::to_sql(definitions, node, &old)
                }
            })
            .collect()
    }

    /// Turns a failed or zero-row statement into the most specific error
    /// by re-reading the row.
    fn diagnose(&mut self, kind: DmlKind, id: EntityId, snapshot: &Snapshot, cause: Option<SqlError>) -> CoreError {
        let (entity_type, key, expected) = match self.ctx.entity(id) {
            Ok(entity) => (
                entity.type_name().to_string(),
                entity.key().cloned().unwrap_or(Value::Null),
                snapshot
                    .row(id)
                    .and_then(Entity::lock_value)
                    .or_else(|| entity.lock_value())
                    .cloned(),
            ),
            Err(err) => return err,
        };
        let current = self.current_lock(id);
        debug!(?kind, entity_type = %entity_type, %key, found = ?current.as_ref().ok(), "re-read row after failed write");
        let fallback = |cause: Option<SqlError>, what: &str| match cause {
            Some(err) => CoreError::Sql(err),
            None => CoreError::persist_failed(format!("{what} of {entity_type} with key {key} affected no rows")),
        };

        match (kind, current) {
            (_, Err(read_err)) => {
                warn!(error = %read_err, "re-reading row after failed write failed");
                fallback(cause, "write")
            }
            (DmlKind::Insert, Ok(Some(_))) => CoreError::PrimaryKeyExists {
                entity: id,
                entity_type: entity_type.clone(),
                key: key.clone(),
            },
            (DmlKind::Insert, Ok(None)) => fallback(cause, "insert"),
            (_, Ok(None)) => CoreError::EntityMissing {
                entity: id,
                entity_type: entity_type.clone(),
                key: key.clone(),
            },
            (DmlKind::Update | DmlKind::Delete, Ok(Some(actual))) => match expected {
                Some(expected) if expected != actual => CoreError::OptimisticLockMismatch {
                    entity: id,
                    entity_type: entity_type.clone(),
                    expected,
                    actual,
                },
                _ => fallback(cause, if kind == DmlKind::Update { "update" } else { "delete" }),
            },
        }
    }

    /// Reads the current lock value of an entity's row, or `None` if the
    /// row is gone. Rows without a lock report null.
    fn current_lock(&mut self, id: EntityId) -> CoreResult<Option<Value>> {
        let entity = self.ctx.entity(id)?;
        let ty = Arc::clone(entity.entity_type());
        let key = entity
            .key()
            .cloned()
            .ok_or_else(|| CoreError::invalid_operation(format!("entity {id} has no key")))?;
        let mut query = QueryObject::new(ty.name());
        let key_prop = query.prop(ty.key_node_name());
        query.filter(key_prop.eq(key));
        let mut aux = self.ctx.sharing_transaction()?;
        let found = aux.perform_query(&query)?;
        Ok(found
            .first()
            .map(|row| aux.get(row).and_then(Entity::lock_value).cloned().unwrap_or(Value::Null)))
    }

    fn post_process(&mut self, plan: &PersistPlan, requested_updates: &[EntityId], stamp: &LockStamp) -> CoreResult<()> {
        for id in plan.create.iter().chain(plan.update.iter()) {
            let entity = self.ctx.entity_mut(id)?;
            let ty = Arc::clone(entity.entity_type());
            if let Some(lock) = ty.lock_node() {
                let value = stamp.value_for(lock)?;
                if let Some(slot) = ty.node_index(lock.name()).and_then(|i| entity.scalar_mut(i)) {
                    *slot = NodeValue::Loaded(value);
                }
            }
        }
        for id in plan.create.iter() {
            let entity = self.ctx.entity_mut(id)?;
            entity.state = EntityState::Loaded;
            entity.constraints.must_exist_in_db = true;
            entity.constraints.must_not_exist_in_db = false;
            for node in &mut entity.nodes {
                if let Node::ToMany(many) = node {
                    many.fetched = true;
                }
            }
            entity.clear_deltas();
            self.ctx.register_key(id)?;
        }
        for id in requested_updates {
            let entity = self.ctx.entity_mut(*id)?;
            entity.constraints.must_exist_in_db = true;
            entity.constraints.must_not_exist_in_db = false;
            entity.clear_deltas();
        }
        for id in plan.delete.iter() {
            let entity = self.ctx.entity_mut(id)?;
            entity.state = EntityState::NotInDb;
            entity.constraints.must_exist_in_db = false;
            entity.constraints.must_not_exist_in_db = true;
            entity.clear_deltas();
            self.ctx.forget_key(id);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Persister<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

fn record(entity: &Entity, operation: OperationType, changes: Vec<Change>) -> AuditRecord {
    AuditRecord {
        entity: entity.id(),
        entity_type: entity.type_name().to_string(),
        key: entity.key().cloned().unwrap_or(Value::Null),
        operation,
        changes,
    }
}

/// Orders the non-empty records by execution order.
fn collect_audit(plan: &PersistPlan, mut records: HashMap<EntityId, AuditRecord>) -> AuditInformation {
    let ordered = plan
        .create
        .iter()
        .chain(plan.update.iter())
        .chain(plan.delete.iter())
        .filter_map(|id| records.remove(&id))
        .filter(|r| !r.changes.is_empty())
        .collect();
    AuditInformation::new(ordered)
}

fn missing_lock(ty: &EntityType) -> CoreError {
    CoreError::configuration(format!("'{}' has no optimistic lock node", ty.name()))
}

/// The row lock used while loading the validation snapshot.
fn validation_lock(env: &Environment) -> LockMode {
    let caps = env.capabilities();
    let config = env.config();
    let wanted = match config.pessimistic_validation {
        PessimisticValidation::Always => true,
        PessimisticValidation::Never => false,
        PessimisticValidation::Auto => !caps.batch_update_counts,
    };
    if !wanted {
        return LockMode::None;
    }
    if let Some(secs) = config.lock_wait_seconds {
        if caps.supports_lock(LockMode::ForUpdateWait(secs)) {
            return LockMode::ForUpdateWait(secs);
        }
    }
    if caps.supports_lock(LockMode::ForUpdate) {
        LockMode::ForUpdate
    } else {
        LockMode::None
    }
}

/// The database rows of the entities being updated, deleted or depended
/// on, read in an auxiliary context on the persist transaction.
struct Snapshot {
    ctx: EntityContext,
    rows: HashMap<EntityId, EntityId>,
}

impl Snapshot {
    fn load(ctx: &mut EntityContext, plan: &PersistPlan, lock: LockMode) -> CoreResult<Self> {
        let mut aux = ctx.sharing_transaction()?;
        let max_conditions = ctx.environment().config().max_batch_conditions.max(1);

        // one dependency order over every row read, so row locks are taken
        // referenced rows first whatever operation touches them
        let union: Vec<EntityId> = plan
            .depends_on
            .iter()
            .chain(plan.update.iter())
            .chain(plan.delete.iter())
            .collect();
        let ordered = match DependencyTree::build(ctx, &union, Direction::Insert) {
            Ok(tree) => tree.into_order(),
            Err(CoreError::DependencyCycle { remaining }) => {
                debug!(remaining, "snapshot rows reference each other, loading in group order");
                union
            }
            Err(err) => return Err(err),
        };

        // per type, in order of first appearance
        let mut by_type: Vec<(Arc<EntityType>, Vec<(EntityId, Value)>)> = Vec::new();
        for id in ordered {
            let entity = ctx.entity(id)?;
            let key = entity.key().cloned().ok_or_else(|| CoreError::EntityMissing {
                entity: id,
                entity_type: entity.type_name().to_string(),
                key: Value::Null,
            })?;
            match by_type.iter_mut().find(|(ty, _)| ty.name() == entity.type_name()) {
                Some((_, keys)) => keys.push((id, key)),
                None => by_type.push((Arc::clone(entity.entity_type()), vec![(id, key)])),
            }
        }

        let mut rows = HashMap::new();
        for (ty, entities) in &by_type {
            for chunk in entities.chunks(max_conditions) {
                let mut query = QueryObject::new(ty.name());
                let key_prop = query.prop(ty.key_node_name());
                query.filter(Condition::or(chunk.iter().map(|(_, key)| key_prop.eq(key.clone()))));
                query.lock(lock);
                aux.perform_query(&query)?;
            }
            for (id, key) in entities {
                let row = aux
                    .find(ty.name(), key)
                    .filter(|row| aux.get(*row).is_some_and(|e| e.state() == EntityState::Loaded))
                    .ok_or_else(|| CoreError::EntityMissing {
                        entity: *id,
                        entity_type: ty.name().to_string(),
                        key: key.clone(),
                    })?;
                let entity = ctx.entity(*id)?;
                let found = aux.entity(row)?;
                if let (Some(expected), Some(actual)) = (entity.lock_value(), found.lock_value()) {
                    if expected != actual {
                        return Err(CoreError::OptimisticLockMismatch {
                            entity: *id,
                            entity_type: ty.name().to_string(),
                            expected: expected.clone(),
                            actual: actual.clone(),
                        });
                    }
                }
                rows.insert(*id, row);
            }
        }
        debug!(rows = rows.len(), types = by_type.len(), %lock, "snapshot loaded");
        Ok(Self { ctx: aux, rows })
    }

    fn row(&self, id: EntityId) -> Option<&Entity> {
        self.rows.get(&id).and_then(|row| self.ctx.get(*row))
    }
}

/// Decides which updates must reach the database.
///
/// An update is required when it changes a column, or when it owns a
/// child without its own lock that is created, deleted or requires an
/// update itself.
struct UpdateFilter<'a> {
    ctx: &'a EntityContext,
    plan: &'a PersistPlan,
    records: &'a HashMap<EntityId, AuditRecord>,
    required: HashSet<EntityId>,
    not_required: HashSet<EntityId>,
    visiting: HashSet<EntityId>,
}

impl<'a> UpdateFilter<'a> {
    fn new(ctx: &'a EntityContext, plan: &'a PersistPlan, records: &'a HashMap<EntityId, AuditRecord>) -> Self {
        Self {
            ctx,
            plan,
            records,
            required: HashSet::new(),
            not_required: HashSet::new(),
            visiting: HashSet::new(),
        }
    }

    fn required(mut self) -> CoreResult<HashSet<EntityId>> {
        let mut keep = HashSet::new();
        for id in self.plan.update.iter() {
            if self.is_required(id)? {
                keep.insert(id);
            }
        }
        Ok(keep)
    }

    fn is_required(&mut self, id: EntityId) -> CoreResult<bool> {
        if self.required.contains(&id) {
            return Ok(true);
        }
        if self.not_required.contains(&id) || !self.visiting.insert(id) {
            return Ok(false);
        }

        let changed = self.records.get(&id).is_some_and(|r| !r.changes.is_empty());
        let mut required = changed || self.plan.create.contains(id) || self.plan.delete.contains(id);
        if !required {
            for child in self.owned_children(id)? {
                let unlocked = self.ctx.entity(child)?.entity_type().lock_node().is_none();
                if unlocked && self.is_required(child)? {
                    required = true;
                    break;
                }
            }
        }

        self.visiting.remove(&id);
        if required {
            self.required.insert(id);
        } else {
            self.not_required.insert(id);
        }
        Ok(required)
    }

    fn owned_children(&self, id: EntityId) -> CoreResult<Vec<EntityId>> {
        let entity = self.ctx.entity(id)?;
        let mut children = Vec::new();
        for (node_type, slot) in entity.entity_type().nodes().iter().zip(entity.nodes()) {
            if !node_type.owns() {
                continue;
            }
            match slot {
                Node::ToMany(many) => {
                    children.extend_from_slice(many.entities());
                    children.extend_from_slice(many.removed());
                }
                Node::Ref(r) => children.extend(r.reference()),
                Node::Value(_) => {}
            }
        }
        Ok(children)
    }
}

/// The optimistic lock value shared by every row written in one call.
///
/// Millisecond stamps are strictly greater than every lock value they
/// replace, so a clock running behind the database still advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockStamp {
    millis: i64,
    counter: i32,
}

impl LockStamp {
    fn compute(ctx: &EntityContext, plan: &PersistPlan, snapshot: &Snapshot) -> CoreResult<Self> {
        let mut max_millis = i64::MIN;
        let mut max_counter = 0i32;
        for id in plan.create.iter().chain(plan.update.iter()) {
            let current = ctx.entity(id)?.lock_value();
            let stored = snapshot.row(id).and_then(Entity::lock_value);
            for value in current.into_iter().chain(stored) {
                if let Value::Integer(v) = value {
                    max_counter = max_counter.max(*v);
                }
                if let Some(millis) = jdbc::as_millis(value) {
                    max_millis = max_millis.max(millis);
                }
            }
        }
        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            millis: now.max(max_millis.saturating_add(1)),
            counter: max_counter.saturating_add(1),
        })
    }

    fn value_for(&self, node: &NodeType) -> CoreResult<Value> {
        match node.semantic_type() {
            SemanticType::Long => Ok(Value::Long(self.millis)),
            SemanticType::Integer => Ok(Value::Integer(self.counter)),
            SemanticType::UtilDate => jdbc::from_millis(self.millis)
                .map(Value::Timestamp)
                .ok_or_else(|| CoreError::type_conversion(format!("lock stamp {} is out of range", self.millis))),
            other => Err(CoreError::configuration(format!(
                "optimistic lock node '{}' cannot hold a {other:?}",
                node.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnSpec;
    use rowgraph_sql::JdbcType;

    #[test]
    fn stamp_values_follow_lock_type() {
        let stamp = LockStamp {
            millis: 1_500,
            counter: 7,
        };
        let long = NodeType::value("v", SemanticType::Long, ColumnSpec::new("V", JdbcType::BigInt)).optimistic_lock();
        let int = NodeType::value("v", SemanticType::Integer, ColumnSpec::new("V", JdbcType::Integer)).optimistic_lock();
        let ts = NodeType::value("v", SemanticType::UtilDate, ColumnSpec::new("V", JdbcType::Timestamp)).optimistic_lock();
        let text = NodeType::value("v", SemanticType::String, ColumnSpec::new("V", JdbcType::Varchar)).optimistic_lock();

        assert_eq!(stamp.value_for(&long).unwrap(), Value::Long(1_500));
        assert_eq!(stamp.value_for(&int).unwrap(), Value::Integer(7));
        assert_eq!(jdbc::as_millis(&stamp.value_for(&ts).unwrap()), Some(1_500));
        assert!(matches!(stamp.value_for(&text), Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn result_counts() {
        let result = PersistResult {
            inserted: 2,
            updated: 1,
            deleted: 0,
            audit: AuditInformation::default(),
        };
        assert_eq!(result.statements(), 3);
        assert!(result.audit().is_empty());
    }
}
