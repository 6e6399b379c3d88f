//! Error types for the OIDC artifact store.
//!
//! "Not found" is never an error here: lookups return `Option`, and
//! `consume`/`destroy` on an absent id succeed silently.

use crate::model::ModelName;

/// Errors that can occur during record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached while establishing the connection.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// An operation was attempted before the connection was established.
    #[error("Store is not connected")]
    NotConnected,

    /// A write collided with a unique secondary index.
    #[error("Constraint violation on {model}: duplicate payload.{field}")]
    ConstraintViolation {
        /// Model whose collection rejected the write.
        model: ModelName,
        /// Payload field guarded by the unique index.
        field: String,
    },

    /// The backing store rejected or failed an operation.
    #[error("Database error: {message}")]
    Database {
        /// Description of the failure.
        message: String,
    },

    /// Serialization/deserialization of a payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of why the input is invalid.
        message: String,
    },
}

impl StoreError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a `ConstraintViolation` error.
    #[must_use]
    pub fn constraint_violation(model: ModelName, field: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            model,
            field: field.into(),
        }
    }

    /// Create a `Database` error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if the store was unreachable at connect time.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if the connection has not been established yet.
    #[must_use]
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Returns `true` if this is a unique-index conflict.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database { .. })
    }

    /// Returns `true` if a payload could not be converted to or from JSON.
    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }

    /// Returns `true` if this is an invalid input error.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_display() {
        let err = StoreError::constraint_violation(ModelName::DeviceCode, "userCode");
        assert!(err.is_constraint_violation());
        assert_eq!(
            err.to_string(),
            "Constraint violation on device_code: duplicate payload.userCode"
        );
    }

    #[test]
    fn test_connection_error() {
        let err = StoreError::connection("refused");
        assert!(err.is_connection_error());
        assert!(!err.is_not_connected());
        assert_eq!(err.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_serialization_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StoreError::from(json_err);
        assert!(err.is_serialization_error());
        assert!(!err.is_database_error());
    }
}
