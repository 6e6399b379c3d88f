//! Service lifecycle: connect, prepare collections, sweep, shut down.

use std::sync::Arc;

use oidc_store::{AdapterFactory, StoreResult};
use oidc_store_postgres::{ConnectionManager, PostgresRecordStore};
use tokio::sync::watch;
use tracing::info;

use crate::config::ServerConfig;

/// A connected store with its background sweeper.
#[derive(Debug)]
pub struct StoreService {
    connection: Arc<ConnectionManager>,
    factory: AdapterFactory,
    sweeper: Option<watch::Sender<bool>>,
}

impl StoreService {
    /// Connect and prepare every model collection.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the database cannot be reached.
    /// Index failures are logged and do not abort startup.
    pub async fn start(config: &ServerConfig) -> StoreResult<Self> {
        let connection = Arc::new(ConnectionManager::new(config.postgres.clone()));
        connection.init().await?;

        let store = Arc::new(PostgresRecordStore::new(Arc::clone(&connection)));
        let factory = AdapterFactory::new(store, config.store.clone());
        factory.ensure_all().await;
        info!(
            models = factory.registry().registered_count(),
            "Model collections ready"
        );

        let sweeper = factory.start_sweeper();

        Ok(Self {
            connection,
            factory,
            sweeper,
        })
    }

    /// Adapter factory for the authorization engine.
    #[must_use]
    pub fn factory(&self) -> &AdapterFactory {
        &self.factory
    }

    /// Stop the sweeper and close the pool.
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            let _ = sweeper.send(true);
        }
        self.connection.close().await;
        info!("Store service stopped");
    }
}
