//! Per-process bookkeeping of models whose indexes have been ensured.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use crate::error::StoreError;
use crate::index::indexes_for;
use crate::model::ModelName;
use crate::store::DynRecordStore;

/// Tracks which models have had their indexes created in this process.
///
/// Each model owns a once-cell: the first caller runs index creation, and any
/// caller that arrives while it is in flight awaits the same result, so the
/// store sees exactly one ensure request per model per registry.
///
/// Index creation failures are logged and swallowed. The model is still
/// marked as seen so a broken index does not turn every write into a retry.
/// A failed collection setup is different: the model stays unmarked and the
/// next operation tries again, since no write can land without a collection.
pub struct ModelRegistry {
    store: DynRecordStore,
    seen: DashMap<ModelName, Arc<OnceCell<()>>>,
}

impl ModelRegistry {
    /// Create an empty registry issuing DDL through `store`.
    #[must_use]
    pub fn new(store: DynRecordStore) -> Self {
        Self {
            store,
            seen: DashMap::new(),
        }
    }

    /// Ensure indexes for `model` exactly once.
    #[instrument(skip(self), fields(model = %model))]
    pub async fn ensure(&self, model: ModelName) {
        // Clone the cell out so no map guard is held across the await.
        let cell = Arc::clone(
            &self
                .seen
                .entry(model)
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        if cell.initialized() {
            return;
        }

        // An empty cell means the next operation retries.
        let _ = cell
            .get_or_try_init(|| async {
                match self.store.ensure_collection(model).await {
                    Ok(()) => {}
                    Err(StoreError::NotConnected) => {
                        debug!("Store not connected, deferring collection setup");
                        return Err(());
                    }
                    Err(e) => {
                        warn!(error = %e, "Collection setup failed, retrying on next use");
                        return Err(());
                    }
                }

                let indexes = indexes_for(model);
                match self.store.ensure_indexes(model, &indexes).await {
                    Ok(()) => {
                        info!(count = indexes.len(), "Indexes ensured");
                        Ok(())
                    }
                    Err(StoreError::NotConnected) => {
                        debug!("Store not connected, deferring index creation");
                        Err(())
                    }
                    Err(e) => {
                        error!(error = %e, "Index creation failed");
                        Ok(())
                    }
                }
            })
            .await;
    }

    /// Ensure indexes for every known model.
    ///
    /// Intended to run once at startup, before the engine serves traffic.
    pub async fn ensure_all(&self) {
        for model in ModelName::ALL {
            self.ensure(model).await;
        }
        debug!(count = self.registered_count(), "All model indexes ensured");
    }

    /// Returns `true` once `model` has completed its ensure step.
    #[must_use]
    pub fn is_registered(&self, model: ModelName) -> bool {
        self.seen
            .get(&model)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of models that completed their ensure step.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.seen
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("registered", &self.registered_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::adapter::{Adapter, AdapterFactory};
    use crate::config::{AdapterConfig, DisconnectedPolicy};
    use crate::error::StoreResult;
    use crate::index::IndexSpec;
    use crate::model::{Payload, StoredRecord};
    use crate::store::RecordStore;

    /// Counts DDL calls; optionally fails them.
    #[derive(Default)]
    struct CountingStore {
        ensure_calls: AtomicUsize,
        fail: bool,
        offline: AtomicBool,
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn ensure_indexes(&self, _: ModelName, _: &[IndexSpec]) -> StoreResult<()> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::NotConnected);
            }
            if self.fail {
                return Err(StoreError::database("index build failed"));
            }
            Ok(())
        }
        async fn find(&self, _: ModelName, _: &str) -> StoreResult<Option<StoredRecord>> {
            Ok(None)
        }
        async fn find_by_field(
            &self,
            _: ModelName,
            _: &str,
            _: &str,
        ) -> StoreResult<Option<StoredRecord>> {
            Ok(None)
        }
        async fn upsert(&self, _: ModelName, _: StoredRecord) -> StoreResult<()> {
            Ok(())
        }
        async fn consume(&self, _: ModelName, _: &str, _: OffsetDateTime) -> StoreResult<()> {
            Ok(())
        }
        async fn destroy(&self, _: ModelName, _: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn delete_by_field(&self, _: ModelName, _: &str, _: &str) -> StoreResult<u64> {
            Ok(0)
        }
        async fn purge_expired(&self, _: ModelName) -> StoreResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_ensure_runs_once_per_model() {
        let store = Arc::new(CountingStore::default());
        let registry = ModelRegistry::new(store.clone());

        registry.ensure(ModelName::Session).await;
        registry.ensure(ModelName::Session).await;
        registry.ensure(ModelName::AccessToken).await;

        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 2);
        assert!(registry.is_registered(ModelName::Session));
        assert!(!registry.is_registered(ModelName::Grant));
        assert_eq!(registry.registered_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_issues_single_request() {
        let store = Arc::new(CountingStore::default());
        let registry = Arc::new(ModelRegistry::new(store.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.ensure(ModelName::DeviceCode).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed_and_marked_seen() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let registry = ModelRegistry::new(store.clone());

        registry.ensure(ModelName::Session).await;
        registry.ensure(ModelName::Session).await;

        assert!(registry.is_registered(ModelName::Session));
        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_connected_defers_until_connected() {
        let store = Arc::new(CountingStore::default());
        store.offline.store(true, Ordering::SeqCst);
        let registry = ModelRegistry::new(store.clone());

        registry.ensure(ModelName::Grant).await;
        assert!(!registry.is_registered(ModelName::Grant));

        store.offline.store(false, Ordering::SeqCst);
        registry.ensure(ModelName::Grant).await;
        assert!(registry.is_registered(ModelName::Grant));
        assert_eq!(store.ensure_calls.load(Ordering::SeqCst), 2);
    }

    /// Needs its collection created before writes succeed; the first setup attempt fails.
    #[derive(Default)]
    struct FlakyCollectionStore {
        collection_calls: AtomicUsize,
        index_calls: AtomicUsize,
        collections: DashMap<ModelName, ()>,
    }

    #[async_trait]
    impl RecordStore for FlakyCollectionStore {
        async fn ensure_collection(&self, model: ModelName) -> StoreResult<()> {
            if self.collection_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::database("pool timed out"));
            }
            self.collections.insert(model, ());
            Ok(())
        }
        async fn ensure_indexes(&self, _: ModelName, _: &[IndexSpec]) -> StoreResult<()> {
            self.index_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn find(&self, _: ModelName, _: &str) -> StoreResult<Option<StoredRecord>> {
            Ok(None)
        }
        async fn find_by_field(
            &self,
            _: ModelName,
            _: &str,
            _: &str,
        ) -> StoreResult<Option<StoredRecord>> {
            Ok(None)
        }
        async fn upsert(&self, model: ModelName, _: StoredRecord) -> StoreResult<()> {
            if self.collections.contains_key(&model) {
                Ok(())
            } else {
                Err(StoreError::database(format!(
                    "relation \"{model}\" does not exist"
                )))
            }
        }
        async fn consume(&self, _: ModelName, _: &str, _: OffsetDateTime) -> StoreResult<()> {
            Ok(())
        }
        async fn destroy(&self, _: ModelName, _: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn delete_by_field(&self, _: ModelName, _: &str, _: &str) -> StoreResult<u64> {
            Ok(0)
        }
        async fn purge_expired(&self, _: ModelName) -> StoreResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_transient_collection_failure_is_retried() {
        let store = Arc::new(FlakyCollectionStore::default());
        let factory = AdapterFactory::new(
            store.clone(),
            AdapterConfig::new(DisconnectedPolicy::FailFast),
        );
        let tokens = factory.adapter(ModelName::AccessToken);

        let first = tokens.upsert("tok1", Payload::new(), Some(60)).await;
        assert!(first.unwrap_err().is_database_error());
        assert!(!factory.registry().is_registered(ModelName::AccessToken));

        tokio_test::assert_ok!(tokens.upsert("tok1", Payload::new(), Some(60)).await);
        tokio_test::assert_ok!(tokens.upsert("tok2", Payload::new(), Some(60)).await);

        assert!(factory.registry().is_registered(ModelName::AccessToken));
        assert_eq!(store.collection_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.index_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_all_covers_every_model() {
        let store = Arc::new(CountingStore::default());
        let registry = ModelRegistry::new(store.clone());

        registry.ensure_all().await;

        assert_eq!(registry.registered_count(), ModelName::ALL.len());
        assert_eq!(
            store.ensure_calls.load(Ordering::SeqCst),
            ModelName::ALL.len()
        );
    }
}
