//! Test fixtures and database helpers.
//!
//! Provides a sample schema and convenience functions for setting up test
//! environments over SQLite.

use crate::recording::{QueryHook, RecordingProvider, StatementLog};
use rowgraph_core::model::{
    ColumnSpec, DefinitionsSet, EntityTypeSpec, KeyGeneration, NodeType, RelationKind, SemanticType,
};
use rowgraph_core::{CollectingAuditor, Config, EntityContext, Environment, JdbcType};
use rowgraph_sql::{Capabilities, Connection, ConnectionProvider, ResultSet, SqlValue, SqliteProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// DDL of the sample schema.
pub const LIBRARY_DDL: &str = "
create table PUBLISHER (
    ID integer primary key,
    NAME text not null,
    VERSION integer
);
create table AUTHOR (
    ID integer primary key,
    NAME text not null,
    BORN text,
    VERSION integer
);
create table BOOK (
    ID integer primary key,
    TITLE text not null,
    PRICE text,
    AUTHOR_ID integer references AUTHOR (ID),
    PUBLISHER_ID integer references PUBLISHER (ID)
);
create table SHAPE (
    ID integer primary key,
    KIND text not null,
    COLOR text,
    RADIUS text,
    SIDE text
);
";

/// The sample metadata.
///
/// - `Publisher`: counter lock `version`
/// - `Author`: millisecond lock `version`, owns `books` sorted by title
/// - `Book`: framework-generated keys, refers to its author and publisher
/// - `Shape`: abstract, discriminated by `kind` into `Circle` (`"C"`) and
///   `Square` (`"S"`)
///
/// # Panics
///
/// Panics if the metadata is inconsistent.
#[must_use]
pub fn library_definitions() -> DefinitionsSet {
    DefinitionsSet::builder()
        .entity_type(
            EntityTypeSpec::new("Publisher")
                .table("PUBLISHER")
                .key("id")
                .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt).not_null()))
                .node(NodeType::value("name", SemanticType::String, ColumnSpec::new("NAME", JdbcType::Varchar).not_null()))
                .node(
                    NodeType::value("version", SemanticType::Integer, ColumnSpec::new("VERSION", JdbcType::Integer))
                        .optimistic_lock(),
                ),
        )
        .entity_type(
            EntityTypeSpec::new("Author")
                .table("AUTHOR")
                .key("id")
                .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt).not_null()))
                .node(NodeType::value("name", SemanticType::String, ColumnSpec::new("NAME", JdbcType::Varchar).not_null()))
                .node(NodeType::value("born", SemanticType::SqlDate, ColumnSpec::new("BORN", JdbcType::Date)))
                .node(
                    NodeType::value("version", SemanticType::Long, ColumnSpec::new("VERSION", JdbcType::BigInt))
                        .optimistic_lock(),
                )
                .node(NodeType::to_many("books", RelationKind::Owns, "Book", "author").sort_by("title")),
        )
        .entity_type(
            EntityTypeSpec::new("Book")
                .table("BOOK")
                .key("id")
                .key_generation(KeyGeneration::Framework)
                .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt).not_null()))
                .node(NodeType::value("title", SemanticType::String, ColumnSpec::new("TITLE", JdbcType::Varchar).not_null()))
                .node(NodeType::value("price", SemanticType::Decimal, ColumnSpec::new("PRICE", JdbcType::Decimal)))
                .node(NodeType::reference(
                    "author",
                    SemanticType::Long,
                    ColumnSpec::new("AUTHOR_ID", JdbcType::BigInt),
                    RelationKind::Refers,
                    "Author",
                ))
                .node(NodeType::reference(
                    "publisher",
                    SemanticType::Long,
                    ColumnSpec::new("PUBLISHER_ID", JdbcType::BigInt),
                    RelationKind::Refers,
                    "Publisher",
                )),
        )
        .entity_type(
            EntityTypeSpec::new("Shape")
                .table("SHAPE")
                .key("id")
                .abstract_type()
                .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt).not_null()))
                .node(NodeType::value("kind", SemanticType::String, ColumnSpec::new("KIND", JdbcType::Varchar).not_null()))
                .node(NodeType::value("color", SemanticType::String, ColumnSpec::new("COLOR", JdbcType::Varchar))),
        )
        .entity_type(
            EntityTypeSpec::new("Circle")
                .extends("Shape")
                .node(
                    NodeType::value("kind", SemanticType::String, ColumnSpec::new("KIND", JdbcType::Varchar).not_null())
                        .fixed_value("C"),
                )
                .node(NodeType::value("radius", SemanticType::Decimal, ColumnSpec::new("RADIUS", JdbcType::Decimal))),
        )
        .entity_type(
            EntityTypeSpec::new("Square")
                .extends("Shape")
                .node(
                    NodeType::value("kind", SemanticType::String, ColumnSpec::new("KIND", JdbcType::Varchar).not_null())
                        .fixed_value("S"),
                )
                .node(NodeType::value("side", SemanticType::Decimal, ColumnSpec::new("SIDE", JdbcType::Decimal))),
        )
        .build()
        .expect("sample metadata is consistent")
}

/// A test environment over the sample schema with automatic cleanup.
pub struct TestEnvironment {
    /// The environment.
    pub env: Environment,
    /// Audit records of every persist call.
    pub auditor: Arc<CollectingAuditor>,
    /// Every statement sent to the database.
    pub log: StatementLog,
    provider: Arc<RecordingProvider>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEnvironment {
    /// Creates an environment over a fresh shared in-memory database.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be set up.
    #[must_use]
    pub fn memory() -> Self {
        Self::builder().build()
    }

    /// Creates an environment over a database file in a temporary
    /// directory.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be set up.
    #[must_use]
    pub fn file() -> Self {
        Self::builder().file().build()
    }

    /// Starts configuring an environment.
    #[must_use]
    pub fn builder() -> TestEnvironmentBuilder {
        TestEnvironmentBuilder::default()
    }

    /// Creates a context.
    #[must_use]
    pub fn context(&self) -> EntityContext {
        self.env.new_context()
    }

    /// Returns the database path if file-based, None if in-memory.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("rowgraph.db"))
    }

    /// Runs SQL on a fresh connection, bypassing the engine and the log.
    ///
    /// # Panics
    ///
    /// Panics if the statement fails.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> u64 {
        let mut conn = self.provider.inner().acquire().expect("acquire connection");
        conn.execute(sql, params).expect("execute statement")
    }

    /// Runs a query on a fresh connection, bypassing the engine and the log.
    ///
    /// # Panics
    ///
    /// Panics if the query fails.
    #[must_use]
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> ResultSet {
        let mut conn = self.provider.inner().acquire().expect("acquire connection");
        conn.query(sql, params).expect("run query")
    }

    /// Runs `hook` after every query the engine sends, on the engine's own
    /// connection. Lets a test change rows between a read and a write of
    /// the same transaction.
    pub fn after_query(&self, hook: QueryHook) {
        self.provider.after_query(hook);
    }

    /// Returns the number of rows in a table.
    ///
    /// # Panics
    ///
    /// Panics if the table does not exist.
    #[must_use]
    pub fn count(&self, table: &str) -> i64 {
        self.query(&format!("select count(*) from {table}"), &[])
            .value(0, 0)
            .and_then(SqlValue::as_i64)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for TestEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEnvironment")
            .field("env", &self.env)
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// Configures a [`TestEnvironment`].
#[derive(Debug, Default)]
pub struct TestEnvironmentBuilder {
    config: Config,
    capabilities: Option<Capabilities>,
    emulate_multiple_result_sets: bool,
    file: bool,
}

impl TestEnvironmentBuilder {
    /// Uses a temporary database file instead of shared memory.
    #[must_use]
    pub fn file(mut self) -> Self {
        self.file = true;
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Overrides the capabilities reported by connections.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Reports multiple result set support and serves combined queries by
    /// splitting them.
    #[must_use]
    pub fn emulate_multiple_result_sets(mut self) -> Self {
        self.emulate_multiple_result_sets = true;
        self
    }

    /// Creates the database, the schema and the environment.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be set up.
    #[must_use]
    pub fn build(self) -> TestEnvironment {
        let (sqlite, temp_dir) = if self.file {
            let dir = TempDir::new().expect("create temp directory");
            let provider = SqliteProvider::file(&dir.path().join("rowgraph.db")).expect("open database file");
            (provider, Some(dir))
        } else {
            (SqliteProvider::memory().expect("open memory database"), None)
        };
        sqlite.execute_script(LIBRARY_DDL).expect("create schema");

        let mut capabilities = self.capabilities.unwrap_or_default();
        if self.emulate_multiple_result_sets {
            capabilities = capabilities.multiple_result_sets(true);
        }
        let sqlite = sqlite.with_capabilities(capabilities);
        let provider = Arc::new(RecordingProvider::new(sqlite, self.emulate_multiple_result_sets));
        let log = provider.log();

        let auditor = Arc::new(CollectingAuditor::new());
        let env = Environment::builder(Arc::new(library_definitions()), Arc::clone(&provider) as Arc<dyn ConnectionProvider>)
            .config(self.config)
            .auditor(Arc::clone(&auditor) as Arc<dyn rowgraph_core::Auditor>)
            .build();

        TestEnvironment {
            env,
            auditor,
            log,
            provider,
            _temp_dir: temp_dir,
        }
    }
}
