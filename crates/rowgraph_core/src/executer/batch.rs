//! Compiling and running query batches.

use crate::entity::EntityContext;
use crate::environment::Environment;
use crate::error::{CoreError, CoreResult};
use crate::executer::loader::EntityLoader;
use crate::executer::QueryResult;
use crate::jdbc;
use crate::projection::Projection;
use crate::query::QueryObject;
use crate::sql::generate_sql;
use rowgraph_sql::{ResultSet, SqlValue};
use tracing::debug;

/// One query with its projection, statement text and bound parameters.
#[derive(Debug)]
pub struct CompiledQuery<'q> {
    /// The query tree.
    pub query: &'q QueryObject,
    /// The select list.
    pub projection: Projection,
    /// Statement text.
    pub sql: String,
    /// Driver parameters, in `?` order.
    pub params: Vec<SqlValue>,
}

impl<'q> CompiledQuery<'q> {
    /// Plans, renders and binds one query.
    ///
    /// # Errors
    ///
    /// Returns query-state, capability and conversion errors.
    pub fn compile(env: &Environment, query: &'q QueryObject) -> CoreResult<Self> {
        let definitions = &**env.definitions();
        let projection = Projection::build(definitions, query)?;
        let mut params = Vec::new();
        let sql = generate_sql(definitions, env.capabilities(), query, &projection, &mut params)?;
        let params = params
            .iter()
            .map(|p| jdbc::to_sql(definitions, &p.node, &p.value))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self {
            query,
            projection,
            sql,
            params,
        })
    }
}

/// Queries executed together and loaded into one context.
#[derive(Debug)]
pub struct QueryBatch<'q> {
    queries: Vec<CompiledQuery<'q>>,
    combine: bool,
}

impl<'q> QueryBatch<'q> {
    /// Compiles every query. The batch uses a single round trip when the
    /// database returns multiple result sets and the configuration allows it.
    ///
    /// # Errors
    ///
    /// Returns the first compilation error.
    pub fn compile(env: &Environment, queries: &[&'q QueryObject]) -> CoreResult<Self> {
        let compiled = queries
            .iter()
            .map(|q| CompiledQuery::compile(env, *q))
            .collect::<CoreResult<Vec<_>>>()?;
        let combine = compiled.len() > 1
            && env.capabilities().multiple_result_sets
            && env.config().use_multiple_result_sets;
        Ok(Self {
            queries: compiled,
            combine,
        })
    }

    /// Returns the compiled queries.
    #[must_use]
    pub fn queries(&self) -> &[CompiledQuery<'q>] {
        &self.queries
    }

    /// Returns `true` if the batch runs in one round trip.
    #[must_use]
    pub const fn is_combined(&self) -> bool {
        self.combine
    }

    /// Returns the statements joined with `;` separators.
    #[must_use]
    pub fn combined_sql(&self) -> String {
        self.queries
            .iter()
            .map(|q| q.sql.as_str())
            .collect::<Vec<_>>()
            .join(";\n")
    }

    /// Runs the batch and loads every result set into `ctx`.
    ///
    /// # Errors
    ///
    /// Returns driver, conversion, downcast and query-state errors.
    pub fn execute(self, ctx: &mut EntityContext) -> CoreResult<Vec<QueryResult>> {
        let sets = self.fetch(ctx)?;
        let mut results = Vec::with_capacity(sets.len());
        for (compiled, rows) in self.queries.iter().zip(sets) {
            results.push(EntityLoader::new(ctx, compiled.query, &compiled.projection).load(rows)?);
        }
        Ok(results)
    }

    fn fetch(&self, ctx: &mut EntityContext) -> CoreResult<Vec<ResultSet>> {
        if self.combine {
            let sql = self.combined_sql();
            let params: Vec<SqlValue> = self.queries.iter().flat_map(|q| q.params.iter().cloned()).collect();
            debug!(queries = self.queries.len(), params = params.len(), "executing combined query batch");
            let expected = self.queries.len();
            return ctx.with_connection(|conn| {
                let sets = conn.query_multiple(&sql, &params)?;
                if sets.len() != expected {
                    return Err(CoreError::illegal_query_state(format!(
                        "expected {expected} result sets, got {}",
                        sets.len()
                    )));
                }
                Ok(sets)
            });
        }
        ctx.with_connection(|conn| {
            let mut sets = Vec::with_capacity(self.queries.len());
            for q in &self.queries {
                debug!(sql = %q.sql, params = q.params.len(), "executing query");
                sets.push(conn.query(&q.sql, &q.params)?);
            }
            Ok(sets)
        })
    }
}
