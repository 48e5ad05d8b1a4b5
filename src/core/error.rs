//! Error types for the mapping and session layers
//!
//! This module defines all error types that can occur while mapping rows,
//! binding parameters, or running transactional sessions.

use crate::core::value::ValueKind;

/// Result type alias for mapping and session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for mapping and session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested column does not exist in the row
    #[error("Column '{column}' not found. Available: {available:?}")]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    /// Row did not contain the expected number of columns
    #[error("Expected exactly one column, but found {found}: {columns:?}")]
    ArityMismatch { found: usize, columns: Vec<String> },

    /// Stored value cannot be read as the requested type
    #[error("{message}")]
    TypeMismatch { message: String },

    /// No row mapper could be resolved for a type
    #[error(
        "No RowMapper found for type {type_name}. \
         Register a mapper explicitly or provide a structural descriptor."
    )]
    MapperNotFound { type_name: String },

    /// Supplied parameter count does not match the statement's placeholders
    #[error("Expected {expected} parameters, but got {supplied}")]
    ParameterCountMismatch { expected: usize, supplied: usize },

    /// Parameter kind the target store cannot bind
    #[error("Unsupported parameter type {kind} at index {index}")]
    UnsupportedParameterType { index: usize, kind: ValueKind },

    /// Result column of a type the decoding layer does not understand
    #[error("Column {index} is of unsupported type {type_name}")]
    UnsupportedColumnType { index: usize, type_name: String },

    /// Transaction lifecycle error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Rollback after a failed unit of work itself failed; both errors
    /// are preserved, the original failure as the source cause
    #[error("Rollback failed ({rollback}) while handling: {source}")]
    RollbackFailed {
        #[source]
        source: Box<Error>,
        rollback: Box<Error>,
    },

    /// Connection or pool error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a column-not-found error listing the columns that do exist
    pub fn column_not_found(column: impl Into<String>, available: Vec<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
            available,
        }
    }

    /// Create a type mismatch error naming the stored and requested types
    pub fn type_mismatch(
        column: &str,
        source_type: Option<&str>,
        stored: &str,
        requested: &str,
    ) -> Self {
        let type_info = source_type.map(|t| format!(" ({})", t)).unwrap_or_default();
        Error::TypeMismatch {
            message: format!(
                "Column '{}'{} contains {}, cannot be read as {}",
                column, type_info, stored, requested
            ),
        }
    }

    /// Create a type mismatch error for a null value in a non-null read
    pub fn null_value(column: &str, requested: &str) -> Self {
        Error::TypeMismatch {
            message: format!(
                "Column '{}' is null, but non-null {} was expected",
                column, requested
            ),
        }
    }

    /// Create a mapper-not-found error for a type
    pub fn mapper_not_found(type_name: impl Into<String>) -> Self {
        Error::MapperNotFound {
            type_name: type_name.into(),
        }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        Error::TransactionError(msg.into())
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::ConnectionError(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Combine a unit-of-work failure with a failed rollback attempt
    pub fn rollback_failed(source: Error, rollback: Error) -> Self {
        Error::RollbackFailed {
            source: Box::new(source),
            rollback: Box::new(rollback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::column_not_found("age", vec!["name".to_string()]);
        assert!(matches!(err, Error::ColumnNotFound { .. }));

        let err = Error::mapper_not_found("Book");
        assert!(matches!(err, Error::MapperNotFound { .. }));

        let err = Error::transaction("nested begin");
        assert!(matches!(err, Error::TransactionError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = Error::type_mismatch("age", Some("INTEGER"), "text", "i64");
        assert_eq!(
            err.to_string(),
            "Column 'age' (INTEGER) contains text, cannot be read as i64"
        );

        let err = Error::null_value("age", "i64");
        assert_eq!(
            err.to_string(),
            "Column 'age' is null, but non-null i64 was expected"
        );

        let err = Error::ParameterCountMismatch {
            expected: 3,
            supplied: 2,
        };
        assert_eq!(err.to_string(), "Expected 3 parameters, but got 2");
    }

    #[test]
    fn test_rollback_failed_preserves_both() {
        let original = Error::transaction("insert blew up");
        let rollback = Error::transaction("connection gone");
        let combined = Error::rollback_failed(original, rollback);

        let text = combined.to_string();
        assert!(text.contains("insert blew up"));
        assert!(text.contains("connection gone"));
        assert!(std::error::Error::source(&combined).is_some());
    }
}
