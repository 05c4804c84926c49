//! Database dialects and capability flags.

use std::fmt;

/// Row locking requested by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockMode {
    /// No locking clause.
    #[default]
    None,
    /// `for update`, blocking until the lock is granted.
    ForUpdate,
    /// `for update wait N`, failing after N seconds.
    ForUpdateWait(u32),
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::ForUpdate => f.write_str("for update"),
            Self::ForUpdateWait(secs) => write!(f, "for update wait {secs}"),
        }
    }
}

/// The SQL dialect spoken by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// Oracle.
    Oracle,
    /// Microsoft SQL Server.
    SqlServer,
    /// MySQL.
    MySql,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Oracle => "oracle",
            Self::SqlServer => "sqlserver",
            Self::MySql => "mysql",
        };
        f.write_str(name)
    }
}

/// What a connected database can do.
///
/// The defaults come from the dialect; individual flags can be overridden
/// when a driver or server version behaves differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The dialect these flags describe.
    pub dialect: Dialect,
    /// Several `;`-separated queries can run in one round trip and return
    /// one result set each.
    pub multiple_result_sets: bool,
    /// `select ... for update` is supported.
    pub select_for_update: bool,
    /// `select ... for update wait N` is supported.
    pub select_for_update_wait: bool,
    /// Batched DML reports a reliable affected-row count per entry.
    pub batch_update_counts: bool,
}

impl Capabilities {
    /// Returns the default capabilities of a dialect.
    #[must_use]
    pub const fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Sqlite => Self {
                dialect,
                multiple_result_sets: false,
                select_for_update: false,
                select_for_update_wait: false,
                batch_update_counts: true,
            },
            Dialect::Postgres => Self {
                dialect,
                multiple_result_sets: true,
                select_for_update: true,
                select_for_update_wait: false,
                batch_update_counts: true,
            },
            Dialect::Oracle => Self {
                dialect,
                multiple_result_sets: false,
                select_for_update: true,
                select_for_update_wait: true,
                batch_update_counts: false,
            },
            Dialect::SqlServer => Self {
                dialect,
                multiple_result_sets: true,
                select_for_update: false,
                select_for_update_wait: false,
                batch_update_counts: true,
            },
            Dialect::MySql => Self {
                dialect,
                multiple_result_sets: true,
                select_for_update: true,
                select_for_update_wait: false,
                batch_update_counts: true,
            },
        }
    }

    /// Overrides multiple result set support.
    #[must_use]
    pub const fn multiple_result_sets(mut self, value: bool) -> Self {
        self.multiple_result_sets = value;
        self
    }

    /// Overrides `for update` support.
    #[must_use]
    pub const fn select_for_update(mut self, value: bool) -> Self {
        self.select_for_update = value;
        self
    }

    /// Overrides `for update wait N` support.
    #[must_use]
    pub const fn select_for_update_wait(mut self, value: bool) -> Self {
        self.select_for_update_wait = value;
        self
    }

    /// Overrides batch update count reliability.
    #[must_use]
    pub const fn batch_update_counts(mut self, value: bool) -> Self {
        self.batch_update_counts = value;
        self
    }

    /// Returns `true` if the lock mode can be expressed on this database.
    #[must_use]
    pub const fn supports_lock(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::None => true,
            LockMode::ForUpdate => self.select_for_update,
            LockMode::ForUpdateWait(_) => self.select_for_update_wait,
        }
    }

    /// Returns the locking clause for a mode, or `None` for no lock.
    ///
    /// Callers must check [`Self::supports_lock`] first.
    #[must_use]
    pub fn lock_clause(&self, mode: LockMode) -> Option<String> {
        match mode {
            LockMode::None => None,
            LockMode::ForUpdate => Some("for update".to_string()),
            LockMode::ForUpdateWait(secs) => Some(format!("for update wait {secs}")),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::for_dialect(Dialect::Sqlite)
    }
}
