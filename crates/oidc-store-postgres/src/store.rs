//! [`RecordStore`] backed by PostgreSQL.
//!
//! Expiry is enforced at read time with a live-row predicate; physically
//! removing elapsed rows is left to [`RecordStore::purge_expired`].
//! Reads against a table that does not exist yet behave like an empty
//! collection.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use oidc_store::index::{indexes_for, unique_fields};
use oidc_store::model::{CONSUMED_FIELD, consumed_stamp, payload_text};
use oidc_store::{IndexSpec, ModelName, RecordStore, StoreError, StoreResult, StoredRecord};
use sqlx_core::error::Error as SqlxError;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, error, instrument, warn};

use crate::connection::ConnectionManager;
use crate::error::{PostgresError, is_undefined_table, map_write_error};
use crate::schema::SchemaManager;

/// Row predicate selecting records whose expiry has not elapsed.
const LIVE: &str = "(expires_at IS NULL OR expires_at > NOW())";

type RecordRow = (String, serde_json::Value, Option<OffsetDateTime>);

/// PostgreSQL implementation of [`RecordStore`].
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    connection: Arc<ConnectionManager>,
    schema: Arc<OnceLock<SchemaManager>>,
}

impl PostgresRecordStore {
    /// Creates a store over a shared connection manager.
    #[must_use]
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self {
            connection,
            schema: Arc::new(OnceLock::new()),
        }
    }

    /// The connection manager this store draws from.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    fn pool(&self) -> StoreResult<&PgPool> {
        self.connection.pool()
    }

    fn schema(&self) -> StoreResult<&SchemaManager> {
        let pool = self.pool()?;
        Ok(self.schema.get_or_init(|| SchemaManager::new(pool.clone())))
    }
}

/// `payload->>'field'` for a plain payload field name.
fn payload_expr(field: &str) -> StoreResult<String> {
    let valid = !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::invalid_input(format!(
            "invalid payload field name '{field}'"
        )));
    }
    Ok(format!("payload->>'{field}'"))
}

fn into_record((id, payload, expires_at): RecordRow) -> StoreResult<StoredRecord> {
    Ok(StoredRecord {
        id,
        payload: serde_json::from_value(payload)?,
        expires_at,
    })
}

/// Insert or replace `record`, first dropping expired holders of its unique keys.
async fn write_record(
    pool: &PgPool,
    model: ModelName,
    record: &StoredRecord,
    payload: &serde_json::Value,
) -> Result<(), SqlxError> {
    let table = SchemaManager::table_name(model);

    // An elapsed record must not keep holding a unique key.
    for field in unique_fields(model) {
        let Some(value) = payload_text(&record.payload, field) else {
            continue;
        };
        let sql = format!(
            r#"DELETE FROM "{table}" WHERE payload->>'{field}' = $1 AND id <> $2 AND NOT {LIVE}"#
        );
        let removed = query(&sql)
            .bind(&value)
            .bind(&record.id)
            .execute(pool)
            .await?
            .rows_affected();
        if removed > 0 {
            debug!(field, removed, "Dropped expired holders of unique key");
        }
    }

    let sql = format!(
        r#"INSERT INTO "{table}" (id, payload, expires_at) VALUES ($1, $2, $3)
           ON CONFLICT (id) DO UPDATE
           SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at"#
    );
    query(&sql)
        .bind(&record.id)
        .bind(payload)
        .bind(record.expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Treats a missing table as an empty collection.
fn or_empty<T: Default>(result: Result<T, SqlxError>) -> StoreResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if is_undefined_table(&e) => Ok(T::default()),
        Err(e) => Err(PostgresError::from(e).into()),
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn ensure_collection(&self, model: ModelName) -> StoreResult<()> {
        self.schema()?.ensure_table(model).await?;
        Ok(())
    }

    async fn ensure_indexes(&self, model: ModelName, indexes: &[IndexSpec]) -> StoreResult<()> {
        self.schema()?.create_indexes(model, indexes).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(model = %model))]
    async fn find(&self, model: ModelName, id: &str) -> StoreResult<Option<StoredRecord>> {
        let table = SchemaManager::table_name(model);
        let sql = format!(
            r#"SELECT id, payload, expires_at FROM "{table}" WHERE id = $1 AND {LIVE}"#
        );
        let row: Option<RecordRow> = or_empty(
            query_as(&sql)
                .bind(id)
                .fetch_optional(self.pool()?)
                .await,
        )?;
        row.map(into_record).transpose()
    }

    #[instrument(skip_all, fields(model = %model, field = %field))]
    async fn find_by_field(
        &self,
        model: ModelName,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        let table = SchemaManager::table_name(model);
        let expr = payload_expr(field)?;
        let sql = format!(
            r#"SELECT id, payload, expires_at FROM "{table}" WHERE {expr} = $1 AND {LIVE} LIMIT 1"#
        );
        let row: Option<RecordRow> = or_empty(
            query_as(&sql)
                .bind(value)
                .fetch_optional(self.pool()?)
                .await,
        )?;
        row.map(into_record).transpose()
    }

    #[instrument(skip_all, fields(model = %model))]
    async fn upsert(&self, model: ModelName, record: StoredRecord) -> StoreResult<()> {
        let payload = serde_json::to_value(&record.payload)?;
        let pool = self.pool()?;

        match write_record(pool, model, &record, &payload).await {
            Err(e) if is_undefined_table(&e) => {
                warn!("Table missing on write, creating it");
                let schema = self.schema()?;
                schema.create_table(model).await?;
                if let Err(e) = schema.create_indexes(model, &indexes_for(model)).await {
                    error!(error = %e, "Index creation failed");
                }
                write_record(pool, model, &record, &payload)
                    .await
                    .map_err(|e| map_write_error(model, e))
            }
            result => result.map_err(|e| map_write_error(model, e)),
        }
    }

    #[instrument(skip_all, fields(model = %model))]
    async fn consume(&self, model: ModelName, id: &str, at: OffsetDateTime) -> StoreResult<()> {
        let table = SchemaManager::table_name(model);
        let sql = format!(
            r#"UPDATE "{table}"
               SET payload = jsonb_set(payload, '{{{CONSUMED_FIELD}}}', to_jsonb($2::bigint))
               WHERE id = $1 AND {LIVE}"#
        );
        let updated = or_empty(
            query(&sql)
                .bind(id)
                .bind(consumed_stamp(at))
                .execute(self.pool()?)
                .await
                .map(|done| done.rows_affected()),
        )?;
        debug!(updated, "Consume applied");
        Ok(())
    }

    #[instrument(skip_all, fields(model = %model))]
    async fn destroy(&self, model: ModelName, id: &str) -> StoreResult<()> {
        let table = SchemaManager::table_name(model);
        let sql = format!(r#"DELETE FROM "{table}" WHERE id = $1"#);
        or_empty(
            query(&sql)
                .bind(id)
                .execute(self.pool()?)
                .await
                .map(|done| done.rows_affected()),
        )?;
        Ok(())
    }

    #[instrument(skip_all, fields(model = %model, field = %field))]
    async fn delete_by_field(
        &self,
        model: ModelName,
        field: &str,
        value: &str,
    ) -> StoreResult<u64> {
        let table = SchemaManager::table_name(model);
        let expr = payload_expr(field)?;
        let sql = format!(r#"DELETE FROM "{table}" WHERE {expr} = $1"#);
        or_empty(
            query(&sql)
                .bind(value)
                .execute(self.pool()?)
                .await
                .map(|done| done.rows_affected()),
        )
    }

    async fn purge_expired(&self, model: ModelName) -> StoreResult<u64> {
        let table = SchemaManager::table_name(model);
        let sql = format!(
            r#"DELETE FROM "{table}" WHERE expires_at IS NOT NULL AND expires_at <= NOW()"#
        );
        or_empty(
            query(&sql)
                .execute(self.pool()?)
                .await
                .map(|done| done.rows_affected()),
        )
    }
}
