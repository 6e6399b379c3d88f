//! Error types for the PostgreSQL record store.

use oidc_store::index::unique_fields;
use oidc_store::{IndexSpec, ModelName, StoreError};
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for undefined table (42P01).
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is "unique violation" (23505).
pub fn is_unique_violation(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNIQUE_VIOLATION)
}

/// Checks if a sqlx error is "undefined table" (42P01).
pub fn is_undefined_table(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNDEFINED_TABLE)
}

/// Errors specific to the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Could not establish the pool.
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// A statement failed.
    #[error("Query error: {0}")]
    Query(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StoreError::connection(e.to_string()),
            PostgresError::Query(SqlxError::PoolClosed) => StoreError::NotConnected,
            PostgresError::Query(e) => StoreError::database(e.to_string()),
            PostgresError::Config { message } => {
                StoreError::invalid_input(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Map a failed write on `model`, turning unique violations into constraint errors.
pub(crate) fn map_write_error(model: ModelName, err: SqlxError) -> StoreError {
    if !is_unique_violation(&err) {
        return PostgresError::from(err).into();
    }
    let constraint = match &err {
        SqlxError::Database(db_err) => db_err.constraint().map(str::to_owned),
        _ => None,
    };
    let field = unique_fields(model)
        .into_iter()
        .find(|field| {
            constraint
                .as_deref()
                .is_some_and(|name| name.ends_with(&IndexSpec::unique(field).name_suffix()))
        })
        .unwrap_or("id");
    StoreError::constraint_violation(model, field)
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
