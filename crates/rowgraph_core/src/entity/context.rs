//! The entity context: identity map and unit-of-work connection.

use crate::entity::{Entity, EntityId, EntityState, Node, NodeValue};
use crate::environment::Environment;
use crate::error::{CoreError, CoreResult};
use crate::executer::{QueryBatch, QueryResult};
use crate::jdbc;
use crate::model::{Definitions, EntityType};
use crate::persist::{PersistRequest, PersistResult, Persister};
use crate::query::QueryObject;
use crate::types::Value;
use parking_lot::Mutex;
use rowgraph_sql::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A connection bound to a context and shared with its auxiliary contexts.
pub(crate) type SharedConnection = Arc<Mutex<Box<dyn Connection>>>;

/// Owns a set of entities and at most one unit-of-work connection.
///
/// Entities are identified by [`EntityId`] and, once they have a key, by
/// (root entity type, key). Loading the same row twice yields the same
/// entity.
///
/// In autocommit mode every query borrows a connection from the provider
/// and returns it; a persist call runs in its own transaction. With
/// autocommit off, the first database access binds a connection and opens a
/// transaction that lasts until [`EntityContext::commit`],
/// [`EntityContext::rollback`] or [`EntityContext::close`].
pub struct EntityContext {
    env: Environment,
    entities: HashMap<EntityId, Entity>,
    order: Vec<EntityId>,
    keys: HashMap<(String, Value), EntityId>,
    connection: Option<SharedConnection>,
    autocommit: bool,
    shares_transaction: bool,
}

impl EntityContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new(env: Environment) -> Self {
        let autocommit = env.config().autocommit;
        Self {
            env,
            entities: HashMap::new(),
            order: Vec::new(),
            keys: HashMap::new(),
            connection: None,
            autocommit,
            shares_transaction: false,
        }
    }

    /// Returns the environment the context belongs to.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Returns the metadata provider.
    #[must_use]
    pub fn definitions(&self) -> &Arc<dyn Definitions> {
        self.env.definitions()
    }

    // --- transaction control -------------------------------------------

    /// Returns the autocommit mode.
    #[must_use]
    pub const fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    /// Switches autocommit mode. Turning it on commits an open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending commit fails.
    pub fn set_autocommit(&mut self, autocommit: bool) -> CoreResult<()> {
        if autocommit && !self.autocommit && self.in_transaction() {
            self.commit()?;
        }
        self.autocommit = autocommit;
        Ok(())
    }

    /// Returns `true` while a bound connection has an open transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.lock().in_transaction())
    }

    /// Commits the open transaction and releases the connection.
    ///
    /// # Errors
    ///
    /// Fails on an auxiliary context or when the driver rejects the commit.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.end_transaction(true)
    }

    /// Rolls back the open transaction and releases the connection.
    ///
    /// # Errors
    ///
    /// Fails on an auxiliary context or when the driver rejects the rollback.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.end_transaction(false)
    }

    /// Rolls back anything pending and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.shares_transaction {
            self.connection = None;
            return Ok(());
        }
        self.end_transaction(false)
    }

    fn end_transaction(&mut self, commit: bool) -> CoreResult<()> {
        if self.shares_transaction {
            return Err(CoreError::invalid_operation(
                "an auxiliary context cannot end the shared transaction",
            ));
        }
        let Some(conn) = self.connection.take() else {
            return Ok(());
        };
        let mut conn = conn.lock();
        if conn.in_transaction() {
            if commit {
                conn.commit()?;
            } else {
                conn.rollback()?;
            }
            debug!(commit, "transaction ended");
        }
        Ok(())
    }

    /// Binds a connection, opening a transaction unless in autocommit mode.
    pub(crate) fn connection(&mut self) -> CoreResult<SharedConnection> {
        if let Some(conn) = &self.connection {
            return Ok(Arc::clone(conn));
        }
        let mut conn = self.env.provider().acquire()?;
        if !self.autocommit {
            conn.begin()?;
        }
        let conn = Arc::new(Mutex::new(conn));
        self.connection = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Returns an autocommit connection to the provider once no
    /// transaction is open on it.
    pub(crate) fn release_connection(&mut self) {
        if self.autocommit && !self.shares_transaction && !self.in_transaction() {
            self.connection = None;
        }
    }

    /// Runs `f` on the bound connection, binding one if needed.
    pub(crate) fn with_connection<T>(
        &mut self,
        f: impl FnOnce(&mut dyn Connection) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let conn = self.connection()?;
        let result = {
            let mut guard = conn.lock();
            f(&mut **guard)
        };
        self.release_connection();
        result
    }

    /// Creates an empty context on the same connection and transaction.
    ///
    /// Used to read database snapshots and run existence checks without
    /// disturbing this context's entities.
    pub(crate) fn sharing_transaction(&mut self) -> CoreResult<Self> {
        let conn = self.connection()?;
        Ok(Self {
            env: self.env.clone(),
            entities: HashMap::new(),
            order: Vec::new(),
            keys: HashMap::new(),
            connection: Some(conn),
            autocommit: false,
            shares_transaction: true,
        })
    }

    // --- entity access -------------------------------------------------

    /// Creates a new entity destined for insertion.
    ///
    /// Every value starts as null, every collection as empty and fetched.
    ///
    /// # Errors
    ///
    /// Fails for unknown or abstract types.
    pub fn new_entity(&mut self, type_name: &str) -> CoreResult<EntityId> {
        let ty = self.concrete_type(type_name)?;
        let mut entity = Entity::new(ty, EntityState::NotInDb, true);
        entity.constraints.must_not_exist_in_db = true;
        Ok(self.insert(entity))
    }

    /// Returns the entity for a key, creating an unloaded one if needed.
    ///
    /// Whether such an entity exists in the database is unknown until it is
    /// loaded or persisted with a save operation.
    ///
    /// # Errors
    ///
    /// Fails for unknown types, a null key, and a key of the wrong type.
    pub fn new_entity_with_key(&mut self, type_name: &str, key: impl Into<Value>) -> CoreResult<EntityId> {
        let ty = self.definitions().entity_type(type_name)?;
        let key = key.into();
        if key.is_null() {
            return Err(CoreError::invalid_operation("entity key cannot be null"));
        }
        let key = match ty.node(ty.key_node_name()) {
            Some(node) => jdbc::coerce(self.definitions().as_ref(), node, key)?,
            None => key,
        };
        let id = self.get_or_create(&ty, key);
        let entity = self.entity_mut(id)?;
        if entity.state == EntityState::NotLoaded {
            for (slot, node_type) in entity.nodes.iter_mut().zip(entity.entity_type.nodes()) {
                if let (Some(fixed), Node::Value(v)) = (node_type.fixed(), slot) {
                    v.value = NodeValue::Loaded(fixed.clone());
                }
            }
        }
        Ok(id)
    }

    /// Returns an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns an entity by id.
    ///
    /// # Errors
    ///
    /// Fails if the entity does not belong to this context.
    pub fn entity(&self, id: EntityId) -> CoreResult<&Entity> {
        self.entities
            .get(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("entity {id} is not in this context")))
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> CoreResult<&mut Entity> {
        self.entities
            .get_mut(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("entity {id} is not in this context")))
    }

    /// Looks up an entity by type and key.
    ///
    /// Any type of the same hierarchy finds the entity.
    #[must_use]
    pub fn find(&self, type_name: &str, key: &Value) -> Option<EntityId> {
        let ty = self.definitions().entity_type_matching(type_name, false).ok()??;
        let key = self.normalize_key(&ty, key.clone());
        self.keys.get(&(ty.root().to_string(), key)).copied()
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the context holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates over the entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    fn concrete_type(&self, type_name: &str) -> CoreResult<Arc<EntityType>> {
        let ty = self.definitions().entity_type(type_name)?;
        if ty.is_abstract() {
            return Err(CoreError::invalid_operation(format!(
                "cannot instantiate abstract entity type '{type_name}'"
            )));
        }
        Ok(ty)
    }

    fn insert(&mut self, entity: Entity) -> EntityId {
        let id = entity.id;
        if let Some(key) = entity.key() {
            self.keys
                .insert((entity.entity_type.root().to_string(), key.clone()), id);
        }
        self.order.push(id);
        self.entities.insert(id, entity);
        id
    }

    /// Returns the entity registered for (type hierarchy, key), creating
    /// an unloaded placeholder when there is none.
    pub(crate) fn get_or_create(&mut self, ty: &Arc<EntityType>, key: Value) -> EntityId {
        let key = self.normalize_key(ty, key);
        if let Some(&id) = self.keys.get(&(ty.root().to_string(), key.clone())) {
            return id;
        }
        let mut entity = Entity::new(Arc::clone(ty), EntityState::NotLoaded, false);
        let key_index = ty.node_index(ty.key_node_name());
        if let Some(slot) = key_index.and_then(|i| entity.scalar_mut(i)) {
            *slot = NodeValue::Loaded(key);
        }
        self.insert(entity)
    }

    /// Brings a key to the type of the key node; keys that cannot be
    /// converted are returned unchanged and simply match nothing.
    fn normalize_key(&self, ty: &EntityType, key: Value) -> Value {
        match ty.node(ty.key_node_name()) {
            Some(node) => jdbc::coerce(self.definitions().as_ref(), node, key.clone()).unwrap_or(key),
            None => key,
        }
    }

    /// Registers the entity's current key in the identity map.
    pub(crate) fn register_key(&mut self, id: EntityId) -> CoreResult<()> {
        let entity = self.entity(id)?;
        let Some(key) = entity.key().cloned() else {
            return Ok(());
        };
        let slot = (entity.entity_type.root().to_string(), key);
        match self.keys.get(&slot) {
            Some(&other) if other != id => Err(CoreError::invalid_operation(format!(
                "{} with key {} is already in the context",
                slot.0, slot.1
            ))),
            _ => {
                self.keys.insert(slot, id);
                Ok(())
            }
        }
    }

    /// Drops the identity map entry of an entity, if it still owns it.
    pub(crate) fn forget_key(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        if let Some(key) = entity.key() {
            let slot = (entity.entity_type.root().to_string(), key.clone());
            if self.keys.get(&slot) == Some(&id) {
                self.keys.remove(&slot);
            }
        }
    }

    // --- mutation --------------------------------------------------------

    /// Assigns a scalar node.
    ///
    /// On a reference node this sets the foreign key and resolves it against
    /// the entities already in the context.
    ///
    /// # Errors
    ///
    /// Fails for unknown or to-many nodes, for changing a discriminator,
    /// for a key already used by another entity, and with `TypeConversion`
    /// for values that do not fit the node.
    pub fn set_value(&mut self, id: EntityId, node: &str, value: impl Into<Value>) -> CoreResult<()> {
        let ty = Arc::clone(&self.entity(id)?.entity_type);
        let index = node_index(&ty, node)?;
        let node_type = &ty.nodes()[index];
        let value = jdbc::coerce(self.definitions().as_ref(), node_type, value.into())?;
        let entity = self.entity(id)?;
        if let Some(fixed) = node_type.fixed() {
            if *fixed != value {
                return Err(CoreError::invalid_operation(format!(
                    "'{}.{node}' is fixed to {fixed}",
                    ty.name()
                )));
            }
        }
        let is_key = node == ty.key_node_name();
        let old_key = entity.key().cloned();

        if node_type.is_reference() {
            let target = node_type
                .target_type()
                .and_then(|t| self.find(t, &value))
                .filter(|_| !value.is_null());
            let slot = self.entity_mut(id)?.ref_mut(index).ok_or_else(|| not_scalar(&ty, node))?;
            slot.fk = NodeValue::Loaded(value);
            slot.reference = target;
            slot.changed = true;
            return Ok(());
        }

        let slot = self
            .entity_mut(id)?
            .scalar_mut(index)
            .ok_or_else(|| not_scalar(&ty, node))?;
        *slot = NodeValue::Loaded(value);

        if is_key {
            if let Err(err) = self.register_key(id) {
                if let Some(slot) = self.entities.get_mut(&id).and_then(|e| e.scalar_mut(index)) {
                    *slot = NodeValue::Loaded(old_key.clone().unwrap_or(Value::Null));
                }
                return Err(err);
            }
            if let Some(old) = old_key {
                let slot = (ty.root().to_string(), old);
                if self.keys.get(&slot) == Some(&id) && self.entity(id)?.key() != Some(&slot.1) {
                    self.keys.remove(&slot);
                }
            }
        }
        Ok(())
    }

    /// Points a reference node at an entity, or clears it.
    ///
    /// # Errors
    ///
    /// Fails for non-reference nodes and targets of the wrong type.
    pub fn set_reference(&mut self, id: EntityId, node: &str, target: Option<EntityId>) -> CoreResult<()> {
        let ty = Arc::clone(&self.entity(id)?.entity_type);
        let index = node_index(&ty, node)?;
        let node_type = &ty.nodes()[index];
        if !node_type.is_reference() {
            return Err(CoreError::invalid_operation(format!(
                "'{}.{node}' is not a reference",
                ty.name()
            )));
        }
        let fk = match target {
            Some(target) => {
                let target_entity = self.entity(target)?;
                let expected = node_type.target_type().unwrap_or_default();
                if !target_entity.entity_type.is_a(expected) {
                    return Err(CoreError::invalid_operation(format!(
                        "'{}.{node}' expects {expected}, got {}",
                        ty.name(),
                        target_entity.type_name()
                    )));
                }
                target_entity.key().cloned().unwrap_or(Value::Null)
            }
            None => Value::Null,
        };
        let slot = self
            .entity_mut(id)?
            .ref_mut(index)
            .ok_or_else(|| not_scalar(&ty, node))?;
        slot.fk = NodeValue::Loaded(fk);
        slot.reference = target;
        slot.changed = true;
        Ok(())
    }

    /// Adds `child` to a to-many collection and points its back reference
    /// at the owner.
    ///
    /// # Errors
    ///
    /// Fails for non to-many nodes and children of the wrong type.
    pub fn add_to_many(&mut self, id: EntityId, node: &str, child: EntityId) -> CoreResult<()> {
        let (index, back_reference) = self.to_many_slot(id, node, child)?;
        self.set_reference(child, &back_reference, Some(id))?;
        let many = self
            .entity_mut(id)?
            .to_many_mut(index)
            .ok_or_else(|| CoreError::invalid_operation(format!("'{node}' is not a collection")))?;
        if !many.entities.contains(&child) {
            many.entities.push(child);
        }
        if let Some(pos) = many.removed.iter().position(|e| *e == child) {
            many.removed.remove(pos);
        } else if !many.added.contains(&child) {
            many.added.push(child);
        }
        Ok(())
    }

    /// Removes `child` from a to-many collection and clears its back
    /// reference. Removed members of an owning collection are deleted on
    /// the next persist.
    ///
    /// # Errors
    ///
    /// Fails for non to-many nodes and children of the wrong type.
    pub fn remove_from_many(&mut self, id: EntityId, node: &str, child: EntityId) -> CoreResult<()> {
        let (index, back_reference) = self.to_many_slot(id, node, child)?;
        let many = self
            .entity_mut(id)?
            .to_many_mut(index)
            .ok_or_else(|| CoreError::invalid_operation(format!("'{node}' is not a collection")))?;
        let Some(pos) = many.entities.iter().position(|e| *e == child) else {
            return Ok(());
        };
        many.entities.remove(pos);
        if let Some(pos) = many.added.iter().position(|e| *e == child) {
            many.added.remove(pos);
        } else {
            many.removed.push(child);
        }
        if self.entity(child)?.reference(&back_reference) == Some(id) {
            self.set_reference(child, &back_reference, None)?;
        }
        Ok(())
    }

    fn to_many_slot(&self, id: EntityId, node: &str, child: EntityId) -> CoreResult<(usize, String)> {
        let ty = &self.entity(id)?.entity_type;
        let index = node_index(ty, node)?;
        let relation = ty.nodes()[index]
            .relation()
            .filter(|_| ty.nodes()[index].is_to_many())
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("'{}.{node}' is not a collection", ty.name()))
            })?;
        let child_type = &self.entity(child)?.entity_type;
        if !child_type.is_a(&relation.target_type) {
            return Err(CoreError::invalid_operation(format!(
                "'{}.{node}' holds {}, got {}",
                ty.name(),
                relation.target_type,
                child_type.name()
            )));
        }
        Ok((index, relation.back_reference.clone().unwrap_or_default()))
    }

    /// Rebuilds a to-many collection from the entities in the context whose
    /// back reference points at the owner.
    pub(crate) fn refresh_to_many(&mut self, id: EntityId, index: usize) -> CoreResult<()> {
        let owner = self.entity(id)?;
        let node_type = &owner.entity_type.nodes()[index];
        let Some(relation) = node_type.relation() else {
            return Ok(());
        };
        let back_reference = relation.back_reference.clone().unwrap_or_default();
        let (added, removed) = match owner.to_many(node_type.name()) {
            Some(m) => (m.added.clone(), m.removed.clone()),
            None => return Ok(()),
        };
        let mut members: Vec<EntityId> = self
            .entities()
            .filter(|e| e.state != EntityState::NotInDb || added.contains(&e.id))
            .filter(|e| e.entity_type.is_a(&relation.target_type))
            .filter(|e| e.reference(&back_reference) == Some(id))
            .filter(|e| !removed.contains(&e.id))
            .map(|e| e.id)
            .collect();
        if let Some(sort) = &relation.sort_node {
            members.sort_by(|a, b| {
                let key = |id: &EntityId| self.get(*id).and_then(|e| e.value(sort)).cloned();
                match (key(a), key(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            });
        }
        if let Some(many) = self.entity_mut(id)?.to_many_mut(index) {
            many.entities = members;
            many.fetched = true;
        }
        Ok(())
    }

    /// Copies the keys of referenced entities into the foreign key slots of
    /// the given entities.
    pub(crate) fn sync_foreign_keys(&mut self, ids: &[EntityId]) -> CoreResult<()> {
        for &id in ids {
            let targets: Vec<(usize, Value)> = self
                .entity(id)?
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(i, n)| match n {
                    Node::Ref(r) => r.reference.map(|t| (i, t)),
                    _ => None,
                })
                .map(|(i, t)| {
                    let key = self.get(t).and_then(Entity::key).cloned().unwrap_or(Value::Null);
                    (i, key)
                })
                .collect();
            let entity = self.entity_mut(id)?;
            for (index, key) in targets {
                if let Some(slot) = entity.ref_mut(index) {
                    slot.fk = NodeValue::Loaded(key);
                }
            }
        }
        Ok(())
    }

    // --- database access ---------------------------------------------------

    /// Runs a query and loads its rows into the context.
    ///
    /// # Errors
    ///
    /// Returns query-state, capability, conversion and driver errors.
    pub fn perform_query(&mut self, query: &QueryObject) -> CoreResult<QueryResult> {
        let mut results = self.perform_queries(&[query])?;
        results
            .pop()
            .ok_or_else(|| CoreError::illegal_query_state("query produced no result"))
    }

    /// Runs several queries, in one round trip when the database allows it.
    ///
    /// # Errors
    ///
    /// Returns query-state, capability, conversion and driver errors.
    pub fn perform_queries(&mut self, queries: &[&QueryObject]) -> CoreResult<Vec<QueryResult>> {
        let batch = QueryBatch::compile(&self.env, queries)?;
        batch.execute(self)
    }

    /// Loads the members of a to-many collection.
    ///
    /// # Errors
    ///
    /// Fails if the node is not a collection or the query fails.
    pub fn fetch(&mut self, id: EntityId, node: &str) -> CoreResult<()> {
        let entity = self.entity(id)?;
        let ty = Arc::clone(&entity.entity_type);
        let index = node_index(&ty, node)?;
        let relation = ty.nodes()[index]
            .relation()
            .filter(|_| ty.nodes()[index].is_to_many())
            .ok_or_else(|| CoreError::invalid_operation(format!("'{}.{node}' is not a collection", ty.name())))?
            .clone();
        if let Some(key) = entity.key().cloned() {
            let mut query = QueryObject::new(relation.target_type.as_str());
            let back = query.prop(relation.back_reference.as_deref().unwrap_or_default());
            query.filter(back.eq(key));
            self.perform_query(&query)?;
        }
        self.refresh_to_many(id, index)
    }

    /// Checks whether the row of an entity exists, without loading it into
    /// this context.
    ///
    /// # Errors
    ///
    /// Fails if the entity has no key or the query fails.
    pub fn exists_in_database(&mut self, id: EntityId) -> CoreResult<bool> {
        let entity = self.entity(id)?;
        let key = entity
            .key()
            .cloned()
            .ok_or_else(|| CoreError::invalid_operation(format!("entity {id} has no key")))?;
        let mut query = QueryObject::new(entity.type_name());
        let key_prop = query.prop(entity.entity_type.key_node_name());
        query.select(Vec::<String>::new());
        query.filter(key_prop.eq(key));
        let mut aux = self.sharing_transaction()?;
        let found = aux.perform_query(&query)?;
        drop(aux);
        self.release_connection();
        Ok(!found.is_empty())
    }

    /// Writes pending changes.
    ///
    /// # Errors
    ///
    /// Returns classification, concurrency, access and driver errors. The
    /// transaction is rolled back when any step fails.
    pub fn persist(&mut self, request: PersistRequest) -> CoreResult<PersistResult> {
        Persister::new(self).persist(request)
    }
}

impl std::fmt::Debug for EntityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContext")
            .field("entities", &self.order.len())
            .field("autocommit", &self.autocommit)
            .field("bound", &self.connection.is_some())
            .field("shares_transaction", &self.shares_transaction)
            .finish_non_exhaustive()
    }
}

fn node_index(ty: &EntityType, node: &str) -> CoreResult<usize> {
    ty.node_index(node).ok_or_else(|| {
        CoreError::invalid_operation(format!("entity type '{}' has no node '{node}'", ty.name()))
    })
}

fn not_scalar(ty: &EntityType, node: &str) -> CoreError {
    CoreError::invalid_operation(format!("'{}.{node}' is not a scalar node", ty.name()))
}
