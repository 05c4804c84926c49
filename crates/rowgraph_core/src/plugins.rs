//! Pluggable collaborators of the persister.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::model::{EntityType, SemanticType};
use crate::persist::{AuditInformation, AuditRecord};
use crate::types::Value;
use parking_lot::Mutex;
use rowgraph_sql::{Connection, SqlValue};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Issues primary keys for entity types with framework key generation.
pub trait SequenceGenerator: Send + Sync {
    /// Returns the next key for `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if no key can be produced.
    fn next_key(&self, entity_type: &EntityType, connection: &mut dyn Connection) -> CoreResult<Value>;
}

/// Scans `max(key)` once per table and counts up in memory.
///
/// Not safe with concurrent writers: two processes (or two environments)
/// can issue the same key. Use a database sequence for production loads.
#[derive(Debug, Default)]
pub struct MaxKeySequenceGenerator {
    last: Mutex<HashMap<String, i64>>,
}

impl MaxKeySequenceGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceGenerator for MaxKeySequenceGenerator {
    fn next_key(&self, entity_type: &EntityType, connection: &mut dyn Connection) -> CoreResult<Value> {
        let key = entity_type.key_node();
        let mut last = self.last.lock();
        let next = match last.get(entity_type.table()) {
            Some(previous) => previous + 1,
            None => {
                let sql = format!(
                    "select max({}) from {}",
                    key.column_name().unwrap_or_default(),
                    entity_type.table()
                );
                let rs = connection.query(&sql, &[])?;
                let max = match rs.value(0, 0) {
                    Some(SqlValue::Integer(v)) => *v,
                    Some(SqlValue::Null) | None => 0,
                    Some(other) => {
                        return Err(CoreError::type_conversion(format!(
                            "max key of {} is not an integer: {other}",
                            entity_type.table()
                        )))
                    }
                };
                max + 1
            }
        };
        last.insert(entity_type.table().to_string(), next);
        debug!(entity_type = entity_type.name(), key = next, "issued key");
        match key.semantic_type() {
            SemanticType::Long => Ok(Value::Long(next)),
            SemanticType::Integer => i32::try_from(next)
                .map(Value::Integer)
                .map_err(|_| CoreError::type_conversion(format!("key {next} overflows an integer"))),
            other => Err(CoreError::configuration(format!(
                "cannot generate keys of type {other:?} for '{}'",
                entity_type.name()
            ))),
        }
    }
}

/// Authorizes writes per entity.
pub trait AccessRightsChecker: Send + Sync {
    /// Checks that `entity` may be inserted.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` to refuse.
    fn verify_create_rights(&self, entity: &Entity) -> CoreResult<()>;

    /// Checks that `entity` may be updated.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` to refuse.
    fn verify_update_rights(&self, entity: &Entity) -> CoreResult<()>;

    /// Checks that `entity` may be deleted.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` to refuse.
    fn verify_delete_rights(&self, entity: &Entity) -> CoreResult<()>;
}

/// Allows everything and logs each check.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAccessRightsChecker;

impl AccessRightsChecker for LoggingAccessRightsChecker {
    fn verify_create_rights(&self, entity: &Entity) -> CoreResult<()> {
        debug!(entity_type = entity.type_name(), entity = %entity.id(), "create allowed");
        Ok(())
    }

    fn verify_update_rights(&self, entity: &Entity) -> CoreResult<()> {
        debug!(entity_type = entity.type_name(), entity = %entity.id(), "update allowed");
        Ok(())
    }

    fn verify_delete_rights(&self, entity: &Entity) -> CoreResult<()> {
        debug!(entity_type = entity.type_name(), entity = %entity.id(), "delete allowed");
        Ok(())
    }
}

/// Receives the audit trail of each successful persist.
pub trait Auditor: Send + Sync {
    /// Records the audit information.
    ///
    /// # Errors
    ///
    /// An error fails the persist and rolls it back.
    fn audit(&self, audit: &AuditInformation) -> CoreResult<()>;
}

/// Logs every audit record as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuditor;

impl Auditor for LoggingAuditor {
    fn audit(&self, audit: &AuditInformation) -> CoreResult<()> {
        for record in audit.records() {
            match serde_json::to_string(record) {
                Ok(json) => info!(target: "rowgraph::audit", record = %json, "audit"),
                Err(err) => {
                    return Err(CoreError::invalid_operation(format!(
                        "cannot serialize audit record: {err}"
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct CollectingAuditor {
    records: Mutex<Vec<AuditRecord>>,
}

impl CollectingAuditor {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record received so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Removes and returns every record received so far.
    pub fn take(&self) -> Vec<AuditRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl Auditor for CollectingAuditor {
    fn audit(&self, audit: &AuditInformation) -> CoreResult<()> {
        self.records.lock().extend(audit.records().iter().cloned());
        Ok(())
    }
}

/// The plugin set of an environment.
#[derive(Clone)]
pub struct Plugins {
    /// Key source for framework key generation.
    pub sequence_generator: Arc<dyn SequenceGenerator>,
    /// Write authorization.
    pub access_rights: Arc<dyn AccessRightsChecker>,
    /// Audit sink.
    pub auditor: Arc<dyn Auditor>,
}

impl Default for Plugins {
    fn default() -> Self {
        Self {
            sequence_generator: Arc::new(MaxKeySequenceGenerator::new()),
            access_rights: Arc::new(LoggingAccessRightsChecker),
            auditor: Arc::new(LoggingAuditor),
        }
    }
}

impl std::fmt::Debug for Plugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugins").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, Definitions, DefinitionsSet, EntityTypeSpec, NodeType};
    use rowgraph_sql::{JdbcType, SqliteConnection};

    fn ticket() -> Arc<EntityType> {
        DefinitionsSet::builder()
            .entity_type(
                EntityTypeSpec::new("Ticket")
                    .table("TICKET")
                    .key("id")
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt))),
            )
            .build()
            .unwrap()
            .entity_type("Ticket")
            .unwrap()
    }

    #[test]
    fn max_key_counts_up_from_table_max() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_script("create table TICKET (ID integer primary key); insert into TICKET values (41);")
            .unwrap();
        let generator = MaxKeySequenceGenerator::new();
        let ty = ticket();
        assert_eq!(generator.next_key(&ty, &mut conn).unwrap(), Value::Long(42));
        assert_eq!(generator.next_key(&ty, &mut conn).unwrap(), Value::Long(43));
    }

    #[test]
    fn max_key_starts_at_one() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_script("create table TICKET (ID integer primary key);").unwrap();
        let generator = MaxKeySequenceGenerator::new();
        assert_eq!(generator.next_key(&ticket(), &mut conn).unwrap(), Value::Long(1));
    }
}
