//! Process-wide connection handle.
//!
//! One pool per process, opened once at startup and shared by every adapter.
//! Stores obtain it through [`ConnectionManager::pool`], which reports
//! [`StoreError::NotConnected`] until [`ConnectionManager::init`] succeeds.

use sqlx_postgres::PgPool;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument};

use oidc_store::{StoreError, StoreResult};

use crate::config::PostgresConfig;
use crate::pool::{create_pool, mask_password, ping};

/// Owns the shared pool for the configured database.
#[derive(Debug)]
pub struct ConnectionManager {
    config: PostgresConfig,
    pool: OnceCell<PgPool>,
}

impl ConnectionManager {
    /// Creates an unconnected manager.
    #[must_use]
    pub fn new(config: PostgresConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    /// Wraps an already open pool.
    #[must_use]
    pub fn from_pool(config: PostgresConfig, pool: PgPool) -> Self {
        Self {
            config,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    /// Opens the pool. Concurrent and repeated calls share a single pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database is unreachable;
    /// a later call may retry.
    #[instrument(skip(self), fields(url = %mask_password(&self.config.url)))]
    pub async fn init(&self) -> StoreResult<&PgPool> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                let pool = create_pool(&self.config).await?;
                ping(&pool).await?;
                Ok::<_, crate::error::PostgresError>(pool)
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to PostgreSQL");
                match StoreError::from(e) {
                    StoreError::Database { message } => StoreError::Connection { message },
                    other => other,
                }
            })?;
        info!("Connected to PostgreSQL");
        Ok(pool)
    }

    /// The shared pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConnected`] before [`init`](Self::init) succeeds.
    pub fn pool(&self) -> StoreResult<&PgPool> {
        self.pool.get().ok_or(StoreError::NotConnected)
    }

    /// Returns `true` once a pool is open and not closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.pool.get().is_some_and(|pool| !pool.is_closed())
    }

    /// Connection settings in use.
    #[must_use]
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("PostgreSQL connection pool closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_before_init_is_not_connected() {
        let manager = ConnectionManager::new(PostgresConfig::default());
        assert!(manager.pool().unwrap_err().is_not_connected());
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connection_error() {
        let manager = ConnectionManager::new(
            PostgresConfig::new("postgres://user:pw@127.0.0.1:1/none")
                .with_pool_size(1)
                .with_connect_timeout_ms(500),
        );
        let err = manager.init().await.unwrap_err();
        assert!(err.is_connection_error(), "unexpected error: {err}");
        assert!(manager.pool().unwrap_err().is_not_connected());

        // Closing an unconnected manager is a no-op.
        manager.close().await;
    }
}
