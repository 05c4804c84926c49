//! SQLite driver backed by `rusqlite`.

use crate::capabilities::Capabilities;
use crate::connection::{Connection, ConnectionProvider, ResultSet};
use crate::error::{SqlError, SqlResult};
use crate::value::SqlValue;
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value as DriverValue, ValueRef};
use rusqlite::ToSql;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

/// Text format used to store timestamps in SQLite.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A connection to a SQLite database.
///
/// SQLite has no native date, decimal or UUID storage, so those values are
/// bound as text and come back as [`SqlValue::Text`]; the engine converts
/// them per column type. Foreign keys are enforced on every connection.
///
/// # Example
///
/// ```rust
/// use rowgraph_sql::{Connection, SqliteConnection};
///
/// let mut conn = SqliteConnection::open_in_memory().unwrap();
/// conn.begin().unwrap();
/// assert!(conn.in_transaction());
/// conn.rollback().unwrap();
/// assert!(!conn.in_transaction());
/// ```
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    capabilities: Capabilities,
}

impl SqliteConnection {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> SqlResult<Self> {
        Self::configure(rusqlite::Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> SqlResult<Self> {
        Self::configure(rusqlite::Connection::open_in_memory()?)
    }

    /// Opens a database by URI (for example a shared-cache memory database).
    ///
    /// # Errors
    ///
    /// Returns an error if the URI cannot be opened.
    pub fn open_uri(uri: &str) -> SqlResult<Self> {
        let conn =
            rusqlite::Connection::open_with_flags(uri, rusqlite::OpenFlags::default())?;
        Self::configure(conn)
    }

    fn configure(conn: rusqlite::Connection) -> SqlResult<Self> {
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            capabilities: Capabilities::default(),
        })
    }

    /// Replaces the reported capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Runs a script of `;`-separated statements without parameters.
    ///
    /// # Errors
    ///
    /// Returns the first driver error.
    pub fn execute_script(&mut self, sql: &str) -> SqlResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("capabilities", &self.capabilities)
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Connection for SqliteConnection {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<ResultSet> {
        trace!(sql = %sql, params = params.len(), "sqlite query");
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(ResultSet::new(columns, out))
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> SqlResult<u64> {
        trace!(sql = %sql, params = params.len(), "sqlite execute");
        let mut stmt = self.conn.prepare_cached(sql)?;
        let affected = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn begin(&mut self) -> SqlResult<()> {
        if self.in_transaction() {
            return Err(SqlError::transaction("transaction already active"));
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> SqlResult<()> {
        if !self.in_transaction() {
            return Err(SqlError::transaction("no active transaction to commit"));
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> SqlResult<()> {
        if !self.in_transaction() {
            return Err(SqlError::transaction("no active transaction to roll back"));
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(DriverValue::Null),
            Self::Boolean(v) => ToSqlOutput::Owned(DriverValue::Integer(i64::from(*v))),
            Self::Integer(v) => ToSqlOutput::Owned(DriverValue::Integer(*v)),
            Self::Double(v) => ToSqlOutput::Owned(DriverValue::Real(*v)),
            Self::Decimal(v) => ToSqlOutput::Owned(DriverValue::Text(v.to_string())),
            Self::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Self::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Self::Date(v) => ToSqlOutput::Owned(DriverValue::Text(v.format("%Y-%m-%d").to_string())),
            Self::Timestamp(v) => {
                ToSqlOutput::Owned(DriverValue::Text(v.format(TIMESTAMP_FORMAT).to_string()))
            }
            Self::Uuid(v) => ToSqlOutput::Owned(DriverValue::Text(v.to_string())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Double(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
    }
}

#[derive(Debug, Clone)]
enum Target {
    Memory(String),
    File(PathBuf),
}

/// Opens SQLite connections to one database.
///
/// The memory variant uses a named shared-cache database so every acquired
/// connection sees the same data; an anchor connection keeps it alive for
/// the provider's lifetime.
pub struct SqliteProvider {
    target: Target,
    capabilities: Capabilities,
    anchor: Option<Mutex<SqliteConnection>>,
}

impl SqliteProvider {
    /// Creates a provider for a fresh shared in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the anchor connection cannot be opened.
    pub fn memory() -> SqlResult<Self> {
        let uri = format!(
            "file:rowgraph-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        );
        let anchor = SqliteConnection::open_uri(&uri)?;
        debug!(uri = %uri, "opened shared memory database");
        Ok(Self {
            target: Target::Memory(uri),
            capabilities: Capabilities::default(),
            anchor: Some(Mutex::new(anchor)),
        })
    }

    /// Creates a provider for a database file, switching it to WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn file(path: &Path) -> SqlResult<Self> {
        let conn = SqliteConnection::open(path)?;
        let mode: String = conn
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "opened database file");
        Ok(Self {
            target: Target::File(path.to_path_buf()),
            capabilities: Capabilities::default(),
            anchor: None,
        })
    }

    /// Replaces the capabilities reported by acquired connections.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Runs a DDL or data script on a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns the first driver error.
    pub fn execute_script(&self, sql: &str) -> SqlResult<()> {
        if let Some(anchor) = &self.anchor {
            return anchor.lock().execute_script(sql);
        }
        self.open()?.execute_script(sql)
    }

    fn open(&self) -> SqlResult<SqliteConnection> {
        let conn = match &self.target {
            Target::Memory(uri) => SqliteConnection::open_uri(uri)?,
            Target::File(path) => SqliteConnection::open(path)?,
        };
        Ok(conn.with_capabilities(self.capabilities))
    }
}

impl std::fmt::Debug for SqliteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteProvider")
            .field("target", &self.target)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ConnectionProvider for SqliteProvider {
    fn acquire(&self) -> SqlResult<Box<dyn Connection>> {
        Ok(Box::new(self.open()?))
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}
