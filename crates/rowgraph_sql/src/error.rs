//! Error types for connection operations.

use std::io;
use thiserror::Error;

/// Result type for connection operations.
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors that can occur while talking to the database.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The driver reported an error.
    #[error("driver error: {0}")]
    Driver(#[from] rusqlite::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The connection does not support the requested feature.
    #[error("unsupported by {dialect}: {feature}")]
    Unsupported {
        /// The dialect of the connection.
        dialect: String,
        /// The feature that was requested.
        feature: String,
    },

    /// A value could not be bound or read.
    #[error("value conversion failed: {0}")]
    Conversion(String),

    /// The connection has been closed.
    #[error("connection is closed")]
    Closed,

    /// A transaction operation was invalid in the current state.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// One row of a batch failed; earlier rows were executed.
    #[error("batch entry {index} failed: {source}")]
    Batch {
        /// Zero-based index of the failing parameter row.
        index: usize,
        /// The underlying failure.
        source: Box<SqlError>,
    },
}

impl SqlError {
    /// Creates an unsupported feature error.
    pub fn unsupported(dialect: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect: dialect.into(),
            feature: feature.into(),
        }
    }

    /// Creates a conversion error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Creates a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Returns the index of the failing batch row, if this is a batch error.
    #[must_use]
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            Self::Batch { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Returns `true` when the driver rejected a statement because of a
    /// primary key or unique constraint.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Batch { source, .. } => source.is_constraint_violation(),
            Self::Driver(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_error_keeps_index() {
        let err = SqlError::Batch {
            index: 3,
            source: Box::new(SqlError::Closed),
        };
        assert_eq!(err.batch_index(), Some(3));
        assert_eq!(err.to_string(), "batch entry 3 failed: connection is closed");
        assert!(!err.is_constraint_violation());
        assert_eq!(SqlError::Closed.batch_index(), None);
    }
}
