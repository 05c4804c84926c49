//! A connection provider that records every statement.

use parking_lot::Mutex;
use rowgraph_sql::{
    BatchCounts, Capabilities, Connection, ConnectionProvider, ResultSet, SqlResult, SqlValue, SqliteProvider,
};
use std::sync::Arc;

/// Statements seen by a [`RecordingProvider`], shared by all its
/// connections.
#[derive(Debug, Clone, Default)]
pub struct StatementLog {
    statements: Arc<Mutex<Vec<String>>>,
}

impl StatementLog {
    fn push(&self, sql: &str) {
        self.statements.lock().push(sql.to_string());
    }

    /// Returns every statement so far, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Returns the statements starting with `insert`, `update` or `delete`.
    #[must_use]
    pub fn dml(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| ["insert", "update", "delete"].iter().any(|p| s.starts_with(p)))
            .collect()
    }

    /// Returns the queries.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with("select"))
            .collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.statements.lock().clear();
    }
}

/// Runs after every query with the query text and the underlying
/// connection, inside whatever transaction that connection has open.
pub type QueryHook = Box<dyn FnMut(&str, &mut dyn Connection) -> SqlResult<()> + Send>;

/// Wraps a [`SqliteProvider`], logging every statement its connections run.
///
/// With emulation on, combined `;\n`-separated queries are split and run
/// one by one, so the multiple result set path can be exercised on SQLite.
pub struct RecordingProvider {
    inner: SqliteProvider,
    log: StatementLog,
    hook: Arc<Mutex<Option<QueryHook>>>,
    emulate_multiple_result_sets: bool,
}

impl RecordingProvider {
    /// Wraps a provider.
    #[must_use]
    pub fn new(inner: SqliteProvider, emulate_multiple_result_sets: bool) -> Self {
        Self {
            inner,
            log: StatementLog::default(),
            hook: Arc::new(Mutex::new(None)),
            emulate_multiple_result_sets,
        }
    }

    /// Installs a hook run after each query of every connection, replacing
    /// any previous one. Statements the hook runs are not logged.
    pub fn after_query(&self, hook: QueryHook) {
        *self.hook.lock() = Some(hook);
    }

    /// Returns the shared log.
    #[must_use]
    pub fn log(&self) -> StatementLog {
        self.log.clone()
    }

    /// Returns the wrapped provider.
    #[must_use]
    pub fn inner(&self) -> &SqliteProvider {
        &self.inner
    }
}

impl std::fmt::Debug for RecordingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingProvider")
            .field("inner", &self.inner)
            .field("emulate_multiple_result_sets", &self.emulate_multiple_result_sets)
            .finish_non_exhaustive()
    }
}

impl ConnectionProvider for RecordingProvider {
    fn acquire(&self) -> SqlResult<Box<dyn Connection>> {
        Ok(Box::new(RecordingConnection {
            inner: self.inner.acquire()?,
            log: self.log.clone(),
            hook: Arc::clone(&self.hook),
            emulate_multiple_result_sets: self.emulate_multiple_result_sets,
        }))
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
}

/// A connection that logs before delegating.
pub struct RecordingConnection {
    inner: Box<dyn Connection>,
    log: StatementLog,
    hook: Arc<Mutex<Option<QueryHook>>>,
    emulate_multiple_result_sets: bool,
}

impl RecordingConnection {
    fn run_hook(&mut self, sql: &str) -> SqlResult<()> {
        match self.hook.lock().as_mut() {
            Some(hook) => hook(sql, &mut *self.inner),
            None => Ok(()),
        }
    }
}

impl Connection for RecordingConnection {
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<ResultSet> {
        self.log.push(sql);
        let rows = self.inner.query(sql, params)?;
        self.run_hook(sql)?;
        Ok(rows)
    }

    fn query_multiple(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<Vec<ResultSet>> {
        if !self.emulate_multiple_result_sets {
            return self.inner.query_multiple(sql, params);
        }
        self.log.push(sql);
        let mut results = Vec::new();
        let mut offset = 0;
        for statement in sql.split(";\n") {
            let count = statement.matches('?').count();
            let end = (offset + count).min(params.len());
            results.push(self.inner.query(statement, &params[offset..end])?);
            offset = end;
        }
        self.run_hook(sql)?;
        Ok(results)
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<u64> {
        self.log.push(sql);
        self.inner.execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> SqlResult<BatchCounts> {
        for _ in rows {
            self.log.push(sql);
        }
        self.inner.execute_batch(sql, rows)
    }

    fn begin(&mut self) -> SqlResult<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> SqlResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> SqlResult<()> {
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}
