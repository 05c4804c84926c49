//! Statement rendering.

use crate::error::{CoreError, CoreResult};
use crate::model::{Definitions, EntityType, NodeType};
use crate::projection::Projection;
use crate::query::{JoinType, QJoin, QueryObject, QueryObjectId};
use crate::types::Value;
use rowgraph_sql::{Capabilities, LockMode};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

/// A positional statement parameter and the node that types it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    /// Node whose metadata drives value conversion.
    pub node: NodeType,
    /// The semantic value.
    pub value: Value,
}

/// Renders the statement for `query` with `projection` as its select list,
/// appending parameters to `params`.
///
/// # Errors
///
/// See [`SqlGenerator::generate`].
pub fn generate_sql(
    definitions: &dyn Definitions,
    capabilities: Capabilities,
    query: &QueryObject,
    projection: &Projection,
    params: &mut Vec<QueryParameter>,
) -> CoreResult<String> {
    SqlGenerator::new(definitions, capabilities).generate(query, projection, params)
}

struct Table {
    alias: String,
    entity_type: Arc<EntityType>,
}

/// Vendor-aware renderer for one statement.
///
/// Table aliases `t0, t1, ...` are assigned in pre-order over the query
/// tree; sub-queries continue the numbering.
pub struct SqlGenerator<'a> {
    definitions: &'a dyn Definitions,
    capabilities: Capabilities,
    tables: HashMap<QueryObjectId, Table>,
    next_alias: usize,
}

impl std::fmt::Debug for SqlGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGenerator")
            .field("capabilities", &self.capabilities)
            .field("tables", &self.tables.len())
            .finish_non_exhaustive()
    }
}

impl<'a> SqlGenerator<'a> {
    /// Creates a generator.
    #[must_use]
    pub fn new(definitions: &'a dyn Definitions, capabilities: Capabilities) -> Self {
        Self {
            definitions,
            capabilities,
            tables: HashMap::new(),
            next_alias: 0,
        }
    }

    /// Renders a top-level statement.
    ///
    /// # Errors
    ///
    /// - `IllegalQueryState` for unknown properties, joins along
    ///   non-relation properties, or an inner join below a left outer join
    /// - `UnsupportedLockMode` if the database cannot express the lock
    pub fn generate(
        &mut self,
        query: &QueryObject,
        projection: &Projection,
        params: &mut Vec<QueryParameter>,
    ) -> CoreResult<String> {
        let mut sql = self.render(query, Some(projection), params)?;

        let mut terms = Vec::new();
        for qo in query.walk() {
            for order in qo.ordering() {
                let (alias, node) = self.column_of(order.property.query_object(), order.property.name())?;
                let column = node.column_name().unwrap_or_default();
                let direction = if order.ascending { "asc" } else { "desc" };
                terms.push(format!("{alias}.{column} {direction}"));
            }
        }
        if !terms.is_empty() {
            let _ = write!(sql, " order by {}", terms.join(", "));
        }

        let mode = query.lock_mode();
        if mode != LockMode::None {
            if !self.capabilities.supports_lock(mode) {
                return Err(CoreError::UnsupportedLockMode {
                    mode,
                    dialect: self.capabilities.dialect.to_string(),
                });
            }
            if let Some(clause) = self.capabilities.lock_clause(mode) {
                let _ = write!(sql, " {clause}");
            }
        }
        Ok(sql)
    }

    /// Renders a query tree without ordering or locking. Without a
    /// projection the select list is the constant `1`.
    ///
    /// Conditions of inner joined query objects are and'ed into the where
    /// clause after the root's own; a left outer joined query object's
    /// condition restricts its `on` clause, so unmatched parents survive.
    pub(crate) fn render(
        &mut self,
        query: &QueryObject,
        projection: Option<&Projection>,
        params: &mut Vec<QueryParameter>,
    ) -> CoreResult<String> {
        for qo in query.walk() {
            let ty = self.definitions.entity_type(qo.entity_type())?;
            let alias = format!("t{}", self.next_alias);
            self.next_alias += 1;
            self.tables.insert(
                qo.id(),
                Table {
                    alias,
                    entity_type: ty,
                },
            );
        }
        for qo in query.walk() {
            for join in qo.joins() {
                if join.join_type == JoinType::LeftOuter {
                    reject_inner_below(&join.target)?;
                }
            }
        }

        let mut sql = String::from("select ");
        match projection {
            Some(p) if !p.is_empty() => {
                let mut columns = Vec::with_capacity(p.len());
                for column in p.columns() {
                    let alias = self.alias(column.query_object)?;
                    columns.push(format!("{alias}.{}", column.node().column_name().unwrap_or_default()));
                }
                sql.push_str(&columns.join(", "));
            }
            _ => sql.push('1'),
        }

        let root = self.table(query.id())?;
        let _ = write!(sql, " from {} {}", root.entity_type.table(), root.alias);
        self.left_outer_chain(query, &mut sql, params)?;

        let mut predicates = Vec::new();
        let mut inner = Vec::new();
        collect_inner(query, &mut inner);
        for (parent, join) in &inner {
            let table = self.table(join.target.id())?;
            let _ = write!(sql, ", {} {}", table.entity_type.table(), table.alias);
            self.left_outer_chain(&join.target, &mut sql, params)?;
            predicates.push(self.join_predicate(parent.id(), &join.property, join.target.id())?);
        }

        if let Some(corr) = query.correlation() {
            predicates.push(self.join_predicate(corr.parent, &corr.property, query.id())?);
        }
        let conditions = std::iter::once(query)
            .chain(inner.iter().map(|(_, join)| &join.target))
            .filter_map(QueryObject::condition);
        for condition in conditions {
            let mut text = String::new();
            self.render_condition(condition, &mut text, params)?;
            predicates.push(text);
        }
        if !predicates.is_empty() {
            let _ = write!(sql, " where {}", predicates.join(" and "));
        }
        Ok(sql)
    }

    fn left_outer_chain(
        &mut self,
        qo: &QueryObject,
        sql: &mut String,
        params: &mut Vec<QueryParameter>,
    ) -> CoreResult<()> {
        for join in qo.joins() {
            if join.join_type != JoinType::LeftOuter {
                continue;
            }
            let mut predicate = self.join_predicate(qo.id(), &join.property, join.target.id())?;
            if let Some(condition) = join.target.condition() {
                predicate.push_str(" and ");
                self.render_condition(condition, &mut predicate, params)?;
            }
            let table = self.table(join.target.id())?;
            let _ = write!(
                sql,
                " left outer join {} {} on {predicate}",
                table.entity_type.table(),
                table.alias
            );
            self.left_outer_chain(&join.target, sql, params)?;
        }
        Ok(())
    }

    /// The equality linking `target` to `parent` through `property`.
    ///
    /// A to-many property compares the target's back reference with the
    /// parent's key; a reference compares the target's key with the
    /// parent's foreign key.
    fn join_predicate(&self, parent: QueryObjectId, property: &str, target: QueryObjectId) -> CoreResult<String> {
        let parent = self.table(parent)?;
        let target = self.table(target)?;
        let node = parent.entity_type.node(property).ok_or_else(|| {
            CoreError::illegal_query_state(format!(
                "cannot join on unknown property '{}.{property}'",
                parent.entity_type.name()
            ))
        })?;
        let relation = node.relation().ok_or_else(|| {
            CoreError::illegal_query_state(format!(
                "cannot join on '{}.{property}': not a relation",
                parent.entity_type.name()
            ))
        })?;
        let related = target.entity_type.is_a(&relation.target_type)
            || self
                .definitions
                .entity_type(&relation.target_type)?
                .is_a(target.entity_type.name());
        if !related {
            return Err(CoreError::illegal_query_state(format!(
                "'{}.{property}' leads to {}, not {}",
                parent.entity_type.name(),
                relation.target_type,
                target.entity_type.name()
            )));
        }

        match &relation.back_reference {
            Some(back) => {
                let fk = target
                    .entity_type
                    .node(back)
                    .and_then(NodeType::column_name)
                    .ok_or_else(|| {
                        CoreError::illegal_query_state(format!(
                            "'{}' has no back reference column '{back}'",
                            target.entity_type.name()
                        ))
                    })?;
                Ok(format!(
                    "{}.{fk} = {}.{}",
                    target.alias,
                    parent.alias,
                    key_column(&parent.entity_type)
                ))
            }
            None => Ok(format!(
                "{}.{} = {}.{}",
                target.alias,
                key_column(&target.entity_type),
                parent.alias,
                node.column_name().unwrap_or_default()
            )),
        }
    }

    fn table(&self, id: QueryObjectId) -> CoreResult<&Table> {
        self.tables.get(&id).ok_or_else(|| {
            CoreError::illegal_query_state(format!("query object {id} is not part of this statement"))
        })
    }

    pub(crate) fn alias(&self, id: QueryObjectId) -> CoreResult<&str> {
        self.table(id).map(|t| t.alias.as_str())
    }

    /// Resolves a property of a query object to its alias and node.
    pub(crate) fn column_of(&self, id: QueryObjectId, property: &str) -> CoreResult<(&str, &NodeType)> {
        let table = self.table(id)?;
        let node = table
            .entity_type
            .node(property)
            .filter(|n| n.column().is_some())
            .ok_or_else(|| {
                CoreError::illegal_query_state(format!(
                    "'{}.{property}' is not a column",
                    table.entity_type.name()
                ))
            })?;
        Ok((&table.alias, node))
    }
}

fn key_column(ty: &EntityType) -> &str {
    ty.key_node().column_name().unwrap_or_default()
}

fn collect_inner<'q>(qo: &'q QueryObject, out: &mut Vec<(&'q QueryObject, &'q QJoin)>) {
    for join in qo.joins() {
        if join.join_type == JoinType::Inner {
            out.push((qo, join));
            collect_inner(&join.target, out);
        }
    }
}

fn reject_inner_below(qo: &QueryObject) -> CoreResult<()> {
    for join in qo.joins() {
        if join.join_type == JoinType::Inner {
            return Err(CoreError::illegal_query_state(format!(
                "inner join on '{}.{}' below a left outer join",
                qo.entity_type(),
                join.property
            )));
        }
        reject_inner_below(&join.target)?;
    }
    Ok(())
}
