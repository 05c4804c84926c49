//! Error types for rowgraph core.

use crate::entity::EntityId;
use crate::types::Value;
use rowgraph_sql::{LockMode, SqlError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in rowgraph core operations.
///
/// Concurrency errors end the current unit of work; callers restart the
/// whole operation with fresh data. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Connection or driver failure.
    #[error("database error: {0}")]
    Sql(#[from] SqlError),

    /// Malformed metadata.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Malformed query tree or unresolvable result.
    #[error("illegal query state: {message}")]
    IllegalQueryState {
        /// Description of the problem.
        message: String,
    },

    /// The database cannot express the requested row lock.
    #[error("lock mode '{mode}' is not supported by {dialect}")]
    UnsupportedLockMode {
        /// The requested mode.
        mode: LockMode,
        /// The connected dialect.
        dialect: String,
    },

    /// The row was modified by someone else since it was loaded.
    #[error("optimistic lock mismatch on {entity_type} {entity}: expected {expected}, found {actual}")]
    OptimisticLockMismatch {
        /// The entity being written.
        entity: EntityId,
        /// Its entity type.
        entity_type: String,
        /// Lock value the entity was loaded with.
        expected: Value,
        /// Lock value currently in the database.
        actual: Value,
    },

    /// The row is expected to exist but does not.
    #[error("{entity_type} {entity} with key {key} is missing from the database")]
    EntityMissing {
        /// The entity being written.
        entity: EntityId,
        /// Its entity type.
        entity_type: String,
        /// The key looked up.
        key: Value,
    },

    /// An insert collided with an existing row.
    #[error("{entity_type} with key {key} already exists")]
    PrimaryKeyExists {
        /// The entity being inserted.
        entity: EntityId,
        /// Its entity type.
        entity_type: String,
        /// The colliding key.
        key: Value,
    },

    /// An abstract entity could not be resolved to one concrete subtype.
    #[error("cannot downcast {entity_type} with key {key}: {matches} concrete subtypes match")]
    DowncastEntity {
        /// The abstract entity type.
        entity_type: String,
        /// Key of the loaded row.
        key: Value,
        /// Number of matching subtypes (must be exactly one).
        matches: usize,
    },

    /// The pending operations contradict the entities' constraints.
    #[error("cannot sort persist request: {message}")]
    SortPersist {
        /// Description of the problem.
        message: String,
    },

    /// The foreign key graph of a persist request has a cycle.
    #[error("dependency cycle between {remaining} entities")]
    DependencyCycle {
        /// Number of entities that could not be ordered.
        remaining: usize,
    },

    /// A value could not be converted.
    #[error("type conversion failed: {message}")]
    TypeConversion {
        /// Description of the problem.
        message: String,
    },

    /// The access-rights checker refused an operation.
    #[error("access denied: {message}")]
    AccessDenied {
        /// Description of the refusal.
        message: String,
    },

    /// A DML statement failed for a reason re-reading the row could not narrow down.
    #[error("persist failed: {message}")]
    PersistFailed {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an illegal query state error.
    pub fn illegal_query_state(message: impl Into<String>) -> Self {
        Self::IllegalQueryState {
            message: message.into(),
        }
    }

    /// Creates a sort persist error.
    pub fn sort_persist(message: impl Into<String>) -> Self {
        Self::SortPersist {
            message: message.into(),
        }
    }

    /// Creates a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Creates an access denied error.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a persist failed error.
    pub fn persist_failed(message: impl Into<String>) -> Self {
        Self::PersistFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by concurrent writers.
    ///
    /// The caller should reload and retry the whole unit of work.
    #[must_use]
    pub const fn is_concurrency_error(&self) -> bool {
        matches!(
            self,
            Self::OptimisticLockMismatch { .. }
                | Self::EntityMissing { .. }
                | Self::PrimaryKeyExists { .. }
        )
    }
}
