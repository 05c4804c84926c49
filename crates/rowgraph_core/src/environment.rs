//! The runtime environment.

use crate::config::Config;
use crate::entity::EntityContext;
use crate::model::{Definitions, EntityType};
use crate::plugins::{AccessRightsChecker, Auditor, Plugins, SequenceGenerator};
use crate::query::QueryObject;
use crate::statement::{DmlKind, PreparedDml, StatementCache};
use parking_lot::Mutex;
use rowgraph_sql::{Capabilities, ConnectionProvider};
use std::sync::Arc;

/// Owns metadata, the connection provider, configuration and plugins.
///
/// Cloning is cheap; every clone shares the same statement cache.
///
/// ```
/// use rowgraph_core::model::{ColumnSpec, DefinitionsSet, EntityTypeSpec, NodeType, SemanticType};
/// use rowgraph_core::{Environment, JdbcType};
/// use rowgraph_sql::SqliteProvider;
/// use std::sync::Arc;
///
/// let defs = DefinitionsSet::builder()
///     .entity_type(
///         EntityTypeSpec::new("Tag")
///             .table("TAG")
///             .key("id")
///             .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt))),
///     )
///     .build()
///     .unwrap();
/// let provider = SqliteProvider::memory().unwrap();
/// provider.execute_script("create table TAG (ID integer primary key);").unwrap();
///
/// let env = Environment::builder(Arc::new(defs), Arc::new(provider)).build();
/// let mut ctx = env.new_context();
/// let result = ctx.perform_query(&env.query("Tag")).unwrap();
/// assert!(result.is_empty());
/// ```
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

struct EnvironmentInner {
    definitions: Arc<dyn Definitions>,
    provider: Arc<dyn ConnectionProvider>,
    config: Config,
    plugins: Plugins,
    statements: Mutex<StatementCache>,
}

impl Environment {
    /// Starts building an environment.
    #[must_use]
    pub fn builder(definitions: Arc<dyn Definitions>, provider: Arc<dyn ConnectionProvider>) -> EnvironmentBuilder {
        EnvironmentBuilder {
            definitions,
            provider,
            config: Config::default(),
            plugins: Plugins::default(),
        }
    }

    /// Creates an empty entity context.
    #[must_use]
    pub fn new_context(&self) -> EntityContext {
        EntityContext::new(self.clone())
    }

    /// Creates a query over an entity type.
    #[must_use]
    pub fn query(&self, entity_type: &str) -> QueryObject {
        QueryObject::new(entity_type)
    }

    /// Returns the metadata provider.
    #[must_use]
    pub fn definitions(&self) -> &Arc<dyn Definitions> {
        &self.inner.definitions
    }

    /// Returns the connection provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.inner.provider
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the database capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.provider.capabilities()
    }

    /// Returns the plugins.
    #[must_use]
    pub fn plugins(&self) -> &Plugins {
        &self.inner.plugins
    }

    /// Returns the cached DML statement for a type and kind.
    #[must_use]
    pub fn statement(&self, entity_type: &EntityType, kind: DmlKind) -> Arc<PreparedDml> {
        self.inner.statements.lock().get_or_prepare(entity_type, kind)
    }

    /// Returns the number of cached DML statements.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.inner.statements.lock().len()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.inner.config)
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Environment`].
pub struct EnvironmentBuilder {
    definitions: Arc<dyn Definitions>,
    provider: Arc<dyn ConnectionProvider>,
    config: Config,
    plugins: Plugins,
}

impl EnvironmentBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Replaces the sequence generator.
    #[must_use]
    pub fn sequence_generator(mut self, generator: Arc<dyn SequenceGenerator>) -> Self {
        self.plugins.sequence_generator = generator;
        self
    }

    /// Replaces the access rights checker.
    #[must_use]
    pub fn access_rights(mut self, checker: Arc<dyn AccessRightsChecker>) -> Self {
        self.plugins.access_rights = checker;
        self
    }

    /// Replaces the auditor.
    #[must_use]
    pub fn auditor(mut self, auditor: Arc<dyn Auditor>) -> Self {
        self.plugins.auditor = auditor;
        self
    }

    /// Builds the environment.
    #[must_use]
    pub fn build(self) -> Environment {
        Environment {
            inner: Arc::new(EnvironmentInner {
                definitions: self.definitions,
                provider: self.provider,
                config: self.config,
                plugins: self.plugins,
                statements: Mutex::new(StatementCache::new()),
            }),
        }
    }
}

impl std::fmt::Debug for EnvironmentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
