//! Prepared DML statements, one per entity type and operation kind.

use crate::model::EntityType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// The kind of a DML statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmlKind {
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

/// Where the value for one `?` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bind {
    /// The entity's current value of the node at this index.
    Value(usize),
    /// The optimistic lock stamp of the current persist cycle.
    NewLock,
    /// The key the row was loaded with.
    OldKey,
    /// The lock value the row was loaded with.
    OldLock,
}

/// A parameterized DML statement and its bind plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDml {
    /// Statement text.
    pub sql: String,
    /// One entry per `?`, in order.
    pub binds: Vec<Bind>,
}

impl PreparedDml {
    /// Builds the statement of `kind` for an entity type.
    ///
    /// To-many nodes have no column and are never bound. The lock column is
    /// set to the new stamp; update and delete match on the old key and,
    /// when the type has a lock, the old lock value (null matching null).
    #[must_use]
    pub fn build(ty: &EntityType, kind: DmlKind) -> Self {
        let key = ty.key_node_name();
        let key_column = ty.key_node().column_name().unwrap_or_default();
        let lock_column = ty.lock_node().and_then(|n| n.column_name());

        let bind_of = |index: usize| {
            if ty.nodes()[index].is_optimistic_lock() {
                Bind::NewLock
            } else {
                Bind::Value(index)
            }
        };
        let columns: Vec<(usize, &str)> = ty
            .nodes()
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.column_name().map(|c| (i, c)))
            .collect();

        let mut binds = Vec::new();
        let mut sql = match kind {
            DmlKind::Insert => {
                let names: Vec<&str> = columns.iter().map(|(_, c)| *c).collect();
                binds.extend(columns.iter().map(|(i, _)| bind_of(*i)));
                format!(
                    "insert into {} ({}) values ({})",
                    ty.table(),
                    names.join(", "),
                    vec!["?"; names.len()].join(", ")
                )
            }
            DmlKind::Update => {
                let assignments: Vec<String> = columns
                    .iter()
                    .filter(|(i, _)| ty.nodes()[*i].name() != key)
                    .map(|(i, c)| {
                        binds.push(bind_of(*i));
                        format!("{c} = ?")
                    })
                    .collect();
                format!("update {} set {}", ty.table(), assignments.join(", "))
            }
            DmlKind::Delete => format!("delete from {}", ty.table()),
        };

        if kind != DmlKind::Insert {
            sql.push_str(&format!(" where {key_column} = ?"));
            binds.push(Bind::OldKey);
            // rows written outside the engine may carry a null lock
            if let Some(lock) = lock_column {
                sql.push_str(&format!(" and ({lock} = ? or ({lock} is null and ? is null))"));
                binds.extend([Bind::OldLock, Bind::OldLock]);
            }
        }
        Self { sql, binds }
    }
}

/// Caches one [`PreparedDml`] per (entity type, kind).
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: HashMap<(String, DmlKind), Arc<PreparedDml>>,
}

impl StatementCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached statement, building it on first use.
    pub fn get_or_prepare(&mut self, ty: &EntityType, kind: DmlKind) -> Arc<PreparedDml> {
        let slot = (ty.name().to_string(), kind);
        if let Some(stmt) = self.statements.get(&slot) {
            return Arc::clone(stmt);
        }
        let stmt = Arc::new(PreparedDml::build(ty, kind));
        trace!(entity_type = ty.name(), ?kind, sql = %stmt.sql, "prepared statement");
        self.statements.insert(slot, Arc::clone(&stmt));
        stmt
    }

    /// Returns the number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, Definitions, DefinitionsSet, EntityTypeSpec, NodeType, RelationKind, SemanticType};
    use rowgraph_sql::JdbcType;

    fn book() -> Arc<EntityType> {
        DefinitionsSet::builder()
            .entity_type(
                EntityTypeSpec::new("Book")
                    .table("BOOK")
                    .key("id")
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
                    .node(NodeType::value("title", SemanticType::String, ColumnSpec::new("TITLE", JdbcType::Varchar)))
                    .node(NodeType::value("version", SemanticType::Long, ColumnSpec::new("VERSION", JdbcType::BigInt)).optimistic_lock())
                    .node(NodeType::to_many("pages", RelationKind::Owns, "Book", "parent"))
                    .node(NodeType::reference(
                        "parent",
                        SemanticType::Long,
                        ColumnSpec::new("PARENT_ID", JdbcType::BigInt),
                        RelationKind::Refers,
                        "Book",
                    )),
            )
            .build()
            .unwrap()
            .entity_type("Book")
            .unwrap()
    }

    #[test]
    fn insert_binds_every_column() {
        let stmt = PreparedDml::build(&book(), DmlKind::Insert);
        assert_eq!(
            stmt.sql,
            "insert into BOOK (ID, TITLE, VERSION, PARENT_ID) values (?, ?, ?, ?)"
        );
        assert_eq!(
            stmt.binds,
            vec![Bind::Value(0), Bind::Value(1), Bind::NewLock, Bind::Value(4)]
        );
    }

    #[test]
    fn update_matches_old_key_and_lock() {
        let stmt = PreparedDml::build(&book(), DmlKind::Update);
        assert_eq!(
            stmt.sql,
            "update BOOK set TITLE = ?, VERSION = ?, PARENT_ID = ? \
             where ID = ? and (VERSION = ? or (VERSION is null and ? is null))"
        );
        assert_eq!(
            stmt.binds,
            vec![Bind::Value(1), Bind::NewLock, Bind::Value(4), Bind::OldKey, Bind::OldLock, Bind::OldLock]
        );
    }

    #[test]
    fn delete_statement() {
        let stmt = PreparedDml::build(&book(), DmlKind::Delete);
        assert_eq!(
            stmt.sql,
            "delete from BOOK where ID = ? and (VERSION = ? or (VERSION is null and ? is null))"
        );
        assert_eq!(stmt.binds, vec![Bind::OldKey, Bind::OldLock, Bind::OldLock]);
    }

    #[test]
    fn cache_reuses_statements() {
        let ty = book();
        let mut cache = StatementCache::new();
        let a = cache.get_or_prepare(&ty, DmlKind::Update);
        let b = cache.get_or_prepare(&ty, DmlKind::Update);
        assert!(Arc::ptr_eq(&a, &b));
        cache.get_or_prepare(&ty, DmlKind::Delete);
        assert_eq!(cache.len(), 2);
    }
}
