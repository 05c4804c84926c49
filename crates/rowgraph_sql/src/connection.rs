//! Connection trait definition.

use crate::capabilities::Capabilities;
use crate::error::SqlResult;
use crate::value::SqlValue;

/// Rows returned by one query.
///
/// Rows are fully materialised; column order is the select-list order of
/// the statement that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    /// Creates a result set from column labels and rows.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Returns the column labels.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the query matched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the value at `row`, `column` (both zero based).
    #[must_use]
    pub fn value(&self, row: usize, column: usize) -> Option<&SqlValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Iterates over the rows.
    pub fn rows(&self) -> impl Iterator<Item = &[SqlValue]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Consumes the result set, returning its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<SqlValue>> {
        self.rows
    }
}

/// Affected-row counts of a batch, one entry per parameter row.
///
/// `None` means the driver executed the entry but could not say how many
/// rows it touched.
pub type BatchCounts = Vec<Option<u64>>;

/// A JDBC-style database connection.
///
/// Statements use positional `?` parameters. A connection starts in
/// autocommit mode; [`Connection::begin`] opens an explicit transaction
/// that lasts until [`Connection::commit`] or [`Connection::rollback`].
///
/// # Invariants
///
/// - `query` returns exactly the columns of the select list, in order
/// - `execute` returns the number of affected rows
/// - `execute_batch` returns one count per parameter row, in order
pub trait Connection: Send {
    /// Returns what this database can do.
    fn capabilities(&self) -> Capabilities;

    /// Runs a query and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement cannot be prepared, a parameter
    /// cannot be bound, or the driver fails.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<ResultSet>;

    /// Runs several `;`-separated queries in one round trip and returns one
    /// result set per query, in order.
    ///
    /// Only available when [`Capabilities::multiple_result_sets`] is set.
    ///
    /// # Errors
    ///
    /// The default implementation always fails with `Unsupported`.
    fn query_multiple(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<Vec<ResultSet>> {
        let _ = (sql, params);
        Err(crate::SqlError::unsupported(
            self.capabilities().dialect.to_string(),
            "multiple result sets",
        ))
    }

    /// Executes a DML statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the statement.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<u64>;

    /// Executes one statement once per parameter row.
    ///
    /// # Errors
    ///
    /// Stops at the first driver error and returns it as
    /// [`SqlError::Batch`](crate::SqlError::Batch) carrying the row index.
    fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> SqlResult<BatchCounts> {
        let mut counts = Vec::with_capacity(rows.len());
        for (index, params) in rows.iter().enumerate() {
            match self.execute(sql, params) {
                Ok(count) => counts.push(Some(count)),
                Err(source) => {
                    return Err(crate::SqlError::Batch {
                        index,
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(counts)
    }

    /// Opens an explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already active.
    fn begin(&mut self) -> SqlResult<()>;

    /// Commits the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active or the commit fails.
    fn commit(&mut self) -> SqlResult<()>;

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is active.
    fn rollback(&mut self) -> SqlResult<()>;

    /// Returns `true` while an explicit transaction is active.
    fn in_transaction(&self) -> bool;
}

/// Hands out connections for units of work.
///
/// Implementations may pool; the engine returns a connection simply by
/// dropping it.
pub trait ConnectionProvider: Send + Sync {
    /// Acquires a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be opened.
    fn acquire(&self) -> SqlResult<Box<dyn Connection>>;

    /// Returns the capabilities of connections from this provider.
    fn capabilities(&self) -> Capabilities;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_set_accessors() {
        let rs = ResultSet::new(
            vec!["a".into(), "b".into()],
            vec![vec![SqlValue::Integer(1), SqlValue::Null]],
        );
        assert_eq!(rs.len(), 1);
        assert!(!rs.is_empty());
        assert_eq!(rs.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(rs.value(0, 0), Some(&SqlValue::Integer(1)));
        assert_eq!(rs.value(0, 2), None);
        assert_eq!(rs.rows().count(), 1);
    }
}
