//! Per-model storage adapter consumed by the authorization engine.
//!
//! The engine asks for one adapter per model name and drives it through the
//! [`Adapter`] trait. Every operation first passes through the lazy
//! index-ensure path of [`ModelRegistry`], then goes straight to the store.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::config::{AdapterConfig, DisconnectedPolicy};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    GRANT_ID_FIELD, ModelName, Payload, StoredRecord, UID_FIELD, USER_CODE_FIELD,
    consumed_stamp,
};
use crate::registry::ModelRegistry;
use crate::store::DynRecordStore;
use crate::sweeper::ExpirySweeper;

/// Storage contract the authorization engine calls for each model.
///
/// "Not found" is `Ok(None)` for lookups and a silent success for
/// `consume`/`destroy`. Only `upsert` can report a
/// [`StoreError::ConstraintViolation`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Look up a payload by id.
    async fn find(&self, id: &str) -> StoreResult<Option<Payload>>;

    /// Insert or replace the record `id`.
    ///
    /// A positive `ttl_seconds` sets `expiresAt = now + ttl`; otherwise the
    /// record has no expiry.
    async fn upsert(&self, id: &str, payload: Payload, ttl_seconds: Option<u64>)
    -> StoreResult<()>;

    /// Stamp `payload.consumed` with the current Unix time. Idempotent.
    async fn consume(&self, id: &str) -> StoreResult<()>;

    /// Delete the record `id`.
    async fn destroy(&self, id: &str) -> StoreResult<()>;

    /// Delete every record of this model tied to `grant_id`.
    async fn revoke_by_grant_id(&self, grant_id: &str) -> StoreResult<()>;

    /// Look up a session-style payload by `payload.uid`.
    async fn find_by_uid(&self, uid: &str) -> StoreResult<Option<Payload>>;

    /// Look up a device-flow payload by `payload.userCode`.
    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<Payload>>;
}

/// Shareable engine-facing adapter.
pub type DynAdapter = Arc<dyn Adapter>;

// =============================================================================
// Storage Adapter
// =============================================================================

/// Adapter bound to a single model name.
#[derive(Clone)]
pub struct StorageAdapter {
    model: ModelName,
    store: DynRecordStore,
    registry: Arc<ModelRegistry>,
    on_disconnected: DisconnectedPolicy,
}

impl StorageAdapter {
    /// Create an adapter for `model` sharing `store` and `registry`.
    #[must_use]
    pub fn new(
        model: ModelName,
        store: DynRecordStore,
        registry: Arc<ModelRegistry>,
        on_disconnected: DisconnectedPolicy,
    ) -> Self {
        Self {
            model,
            store,
            registry,
            on_disconnected,
        }
    }

    /// The model this adapter serves.
    #[must_use]
    pub fn model(&self) -> ModelName {
        self.model
    }

    /// Look up the full record, including its expiry metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn find_record(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        self.registry.ensure(self.model).await;
        let result = self.store.find(self.model, id).await;
        self.degrade("find", result, None)
    }

    async fn find_payload_by(&self, field: &'static str, value: &str) -> StoreResult<Option<Payload>> {
        self.registry.ensure(self.model).await;
        let result = self.store.find_by_field(self.model, field, value).await;
        Ok(self
            .degrade("find_by_field", result, None)?
            .map(|record| record.payload))
    }

    /// Apply the disconnected policy to a store result.
    fn degrade<T>(&self, op: &'static str, result: StoreResult<T>, empty: T) -> StoreResult<T> {
        match result {
            Err(StoreError::NotConnected)
                if self.on_disconnected == DisconnectedPolicy::EmptyResult =>
            {
                warn!(model = %self.model, op, "Store not connected, returning empty result");
                Ok(empty)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("model", &self.model)
            .field("on_disconnected", &self.on_disconnected)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Adapter for StorageAdapter {
    async fn find(&self, id: &str) -> StoreResult<Option<Payload>> {
        Ok(self.find_record(id).await?.map(|record| record.payload))
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn upsert(
        &self,
        id: &str,
        payload: Payload,
        ttl_seconds: Option<u64>,
    ) -> StoreResult<()> {
        self.registry.ensure(self.model).await;
        let record = StoredRecord::new(id, payload, ttl_seconds);
        let result = self.store.upsert(self.model, record).await;
        self.degrade("upsert", result, ())
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn consume(&self, id: &str) -> StoreResult<()> {
        self.registry.ensure(self.model).await;
        let now = OffsetDateTime::now_utc();
        debug!(consumed = consumed_stamp(now), "Consuming record");
        let result = self.store.consume(self.model, id, now).await;
        self.degrade("consume", result, ())
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn destroy(&self, id: &str) -> StoreResult<()> {
        self.registry.ensure(self.model).await;
        let result = self.store.destroy(self.model, id).await;
        self.degrade("destroy", result, ())
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn revoke_by_grant_id(&self, grant_id: &str) -> StoreResult<()> {
        self.registry.ensure(self.model).await;
        let result = self
            .store
            .delete_by_field(self.model, GRANT_ID_FIELD, grant_id)
            .await;
        let removed = self.degrade("revoke_by_grant_id", result, 0)?;
        if removed > 0 {
            debug!(removed, "Revoked records by grant");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn find_by_uid(&self, uid: &str) -> StoreResult<Option<Payload>> {
        self.find_payload_by(UID_FIELD, uid).await
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn find_by_user_code(&self, user_code: &str) -> StoreResult<Option<Payload>> {
        self.find_payload_by(USER_CODE_FIELD, user_code).await
    }
}

// =============================================================================
// Adapter Factory
// =============================================================================

/// Hands out per-model adapters over one shared store and registry.
///
/// # Example
///
/// ```ignore
/// let factory = AdapterFactory::new(store, AdapterConfig::new(DisconnectedPolicy::FailFast));
/// factory.ensure_all().await;
///
/// let tokens = factory.adapter_for("AccessToken")?;
/// tokens.upsert("tok1", payload, Some(3600)).await?;
/// ```
#[derive(Clone)]
pub struct AdapterFactory {
    store: DynRecordStore,
    registry: Arc<ModelRegistry>,
    config: AdapterConfig,
}

impl AdapterFactory {
    /// Create a factory over `store`.
    #[must_use]
    pub fn new(store: DynRecordStore, config: AdapterConfig) -> Self {
        let registry = Arc::new(ModelRegistry::new(Arc::clone(&store)));
        Self {
            store,
            registry,
            config,
        }
    }

    /// Adapter for `model`.
    #[must_use]
    pub fn adapter(&self, model: ModelName) -> StorageAdapter {
        StorageAdapter::new(
            model,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.on_disconnected,
        )
    }

    /// Adapter for a model given by the engine's name for it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` for an unknown model name.
    pub fn adapter_for(&self, name: &str) -> StoreResult<StorageAdapter> {
        Ok(self.adapter(name.parse()?))
    }

    /// Ensure indexes for every model before serving traffic.
    pub async fn ensure_all(&self) {
        self.registry.ensure_all().await;
    }

    /// Start the background expiry sweeper if enabled.
    ///
    /// Returns the shutdown sender; send `true` to stop the sweeper.
    #[must_use]
    pub fn start_sweeper(&self) -> Option<watch::Sender<bool>> {
        if !self.config.sweeper_enabled() {
            debug!("Expiry sweeper disabled");
            return None;
        }
        let sweeper = ExpirySweeper::new(Arc::clone(&self.store), self.config.sweep_interval);
        Some(sweeper.start())
    }

    /// The shared model registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// The adapter configuration.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

impl std::fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::index::IndexSpec;
    use crate::store::RecordStore;

    /// A store whose connection never came up.
    struct OfflineStore;

    #[async_trait]
    impl RecordStore for OfflineStore {
        async fn ensure_indexes(&self, _: ModelName, _: &[IndexSpec]) -> StoreResult<()> {
            Err(StoreError::NotConnected)
        }
        async fn find(&self, _: ModelName, _: &str) -> StoreResult<Option<StoredRecord>> {
            Err(StoreError::NotConnected)
        }
        async fn find_by_field(
            &self,
            _: ModelName,
            _: &str,
            _: &str,
        ) -> StoreResult<Option<StoredRecord>> {
            Err(StoreError::NotConnected)
        }
        async fn upsert(&self, _: ModelName, _: StoredRecord) -> StoreResult<()> {
            Err(StoreError::NotConnected)
        }
        async fn consume(&self, _: ModelName, _: &str, _: OffsetDateTime) -> StoreResult<()> {
            Err(StoreError::NotConnected)
        }
        async fn destroy(&self, _: ModelName, _: &str) -> StoreResult<()> {
            Err(StoreError::NotConnected)
        }
        async fn delete_by_field(&self, _: ModelName, _: &str, _: &str) -> StoreResult<u64> {
            Err(StoreError::NotConnected)
        }
        async fn purge_expired(&self, _: ModelName) -> StoreResult<u64> {
            Err(StoreError::NotConnected)
        }
    }

    fn factory(policy: DisconnectedPolicy) -> AdapterFactory {
        AdapterFactory::new(Arc::new(OfflineStore), AdapterConfig::new(policy))
    }

    #[tokio::test]
    async fn test_fail_fast_surfaces_not_connected() {
        let adapter = factory(DisconnectedPolicy::FailFast).adapter(ModelName::AccessToken);

        let err = adapter.find("tok1").await.unwrap_err();
        assert!(err.is_not_connected());
        let err = adapter
            .upsert("tok1", Payload::new(), Some(60))
            .await
            .unwrap_err();
        assert!(err.is_not_connected());
        assert!(adapter.revoke_by_grant_id("g1").await.unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn test_empty_result_degrades_silently() {
        let adapter = factory(DisconnectedPolicy::EmptyResult).adapter(ModelName::Session);

        tokio_test::assert_ok!(adapter.upsert("s1", Payload::new(), None).await);
        tokio_test::assert_ok!(adapter.consume("s1").await);
        tokio_test::assert_ok!(adapter.destroy("s1").await);
        tokio_test::assert_ok!(adapter.revoke_by_grant_id("g1").await);
        assert_eq!(adapter.find("s1").await.unwrap(), None);
        assert_eq!(adapter.find_by_uid("u-1").await.unwrap(), None);
        assert_eq!(adapter.find_by_user_code("ABCD").await.unwrap(), None);
    }

    #[test]
    fn test_adapter_for_engine_names() {
        let factory = factory(DisconnectedPolicy::FailFast);
        assert_eq!(
            factory.adapter_for("DeviceCode").unwrap().model(),
            ModelName::DeviceCode
        );
        assert!(factory.adapter_for("Unknown").unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_sweeper_disabled_by_zero_interval() {
        let factory = AdapterFactory::new(
            Arc::new(OfflineStore),
            AdapterConfig::new(DisconnectedPolicy::FailFast)
                .with_sweep_interval(std::time::Duration::ZERO),
        );
        assert!(factory.start_sweeper().is_none());
    }
}
