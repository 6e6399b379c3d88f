//! Table and index DDL for model collections.
//!
//! Each model gets its own table:
//!
//! ```sql
//! CREATE TABLE "<model>" (
//!     id TEXT PRIMARY KEY,
//!     payload JSONB NOT NULL,
//!     expires_at TIMESTAMPTZ
//! )
//! ```
//!
//! Payload indexes are expression indexes over `payload->>'<field>'`.
//! PostgreSQL has no TTL index; the expiry index only speeds up the
//! live-row filter and the periodic purge.

use std::sync::Arc;

use dashmap::DashSet;
use oidc_store::{IndexField, IndexSpec, ModelName};
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{PostgresError, Result};

/// Creates model tables and their indexes, remembering which tables exist.
#[derive(Debug, Clone)]
pub struct SchemaManager {
    pool: PgPool,
    /// Tables known to exist.
    created_tables: Arc<DashSet<ModelName>>,
}

impl SchemaManager {
    /// Creates a new `SchemaManager` with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            created_tables: Arc::new(DashSet::new()),
        }
    }

    /// Table name for a model.
    #[must_use]
    pub fn table_name(model: ModelName) -> &'static str {
        model.collection()
    }

    /// Index name for `spec` on `model`'s table.
    #[must_use]
    pub fn index_name(model: ModelName, spec: &IndexSpec) -> String {
        format!("idx_{}_{}", Self::table_name(model), spec.name_suffix())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for `model`.
    #[must_use]
    pub fn create_table_sql(model: ModelName) -> String {
        let table = Self::table_name(model);
        format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (
                id TEXT PRIMARY KEY,
                payload JSONB NOT NULL,
                expires_at TIMESTAMPTZ
            )"#
        )
    }

    /// `CREATE [UNIQUE] INDEX IF NOT EXISTS` statement for `spec`.
    #[must_use]
    pub fn create_index_sql(model: ModelName, spec: &IndexSpec) -> String {
        let table = Self::table_name(model);
        let name = Self::index_name(model, spec);
        let unique = if spec.unique { "UNIQUE " } else { "" };
        let column = match spec.field {
            IndexField::ExpiresAt => "expires_at".to_string(),
            IndexField::Payload(field) => format!("(payload->>'{field}')"),
        };
        format!(r#"CREATE {unique}INDEX IF NOT EXISTS "{name}" ON "{table}" ({column})"#)
    }

    /// Creates the table for `model` unless it is already known to exist.
    #[instrument(skip(self), fields(model = %model))]
    pub async fn ensure_table(&self, model: ModelName) -> Result<()> {
        if self.created_tables.contains(&model) {
            debug!("Table found in cache");
            return Ok(());
        }
        self.create_table(model).await
    }

    /// Issues the table DDL regardless of the cache.
    ///
    /// Used when a write finds the table gone from under a cached entry.
    pub async fn create_table(&self, model: ModelName) -> Result<()> {
        sqlx_core::query::query(&Self::create_table_sql(model))
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        info!(table = Self::table_name(model), "Model table ready");
        self.created_tables.insert(model);
        Ok(())
    }

    /// Applies `indexes` to the table for `model`, creating the table first if needed.
    #[instrument(skip(self, indexes), fields(model = %model))]
    pub async fn create_indexes(&self, model: ModelName, indexes: &[IndexSpec]) -> Result<()> {
        self.ensure_table(model).await?;

        for spec in indexes {
            sqlx_core::query::query(&Self::create_index_sql(model, spec))
                .execute(&self.pool)
                .await
                .map_err(PostgresError::from)?;
            debug!(index = %Self::index_name(model, spec), "Index ready");
        }
        Ok(())
    }
}
