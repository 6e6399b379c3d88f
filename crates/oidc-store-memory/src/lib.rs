//! In-memory record store for oidc-store.
//!
//! Implements [`RecordStore`] with the same observable contract as the
//! database backends: unique indexes exist only after `ensure_indexes`,
//! expired records are invisible until purged, and every single-record
//! mutation is atomic under the collection's write lock.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use oidc_store::{AdapterConfig, AdapterFactory, DisconnectedPolicy};
//! use oidc_store_memory::MemoryRecordStore;
//!
//! let store = Arc::new(MemoryRecordStore::new());
//! let factory = AdapterFactory::new(store, AdapterConfig::new(DisconnectedPolicy::FailFast));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use oidc_store::index::IndexField;
use oidc_store::model::{CONSUMED_FIELD, consumed_stamp, payload_text};
use oidc_store::{
    IndexSpec, ModelName, Payload, RecordStore, StoreError, StoreResult, StoredRecord,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Records of one model plus the unique constraints applied to them.
#[derive(Debug, Default)]
struct Collection {
    records: HashMap<String, StoredRecord>,
    unique_fields: Vec<&'static str>,
}

impl Collection {
    fn live(&self, id: &str, now: OffsetDateTime) -> Option<&StoredRecord> {
        self.records.get(id).filter(|r| !r.is_expired_at(now))
    }

    /// Enforce unique indexes for `record`, dropping expired holders of the same key.
    fn check_unique(
        &mut self,
        model: ModelName,
        record: &StoredRecord,
        now: OffsetDateTime,
    ) -> StoreResult<()> {
        for field in self.unique_fields.clone() {
            let Some(value) = payload_text(&record.payload, field) else {
                continue;
            };
            let holders: Vec<String> = self
                .records
                .values()
                .filter(|other| other.id != record.id)
                .filter(|other| {
                    payload_text(&other.payload, field).as_deref() == Some(value.as_str())
                })
                .map(|other| other.id.clone())
                .collect();
            for id in holders {
                let expired = self.records.get(&id).is_some_and(|r| r.is_expired_at(now));
                if !expired {
                    return Err(StoreError::constraint_violation(model, field));
                }
                self.records.remove(&id);
            }
        }
        Ok(())
    }
}

/// In-process [`RecordStore`] keyed by model.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    collections: DashMap<ModelName, Arc<RwLock<Collection>>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, model: ModelName) -> Arc<RwLock<Collection>> {
        Arc::clone(&self.collections.entry(model).or_default())
    }

    /// Number of records physically held for `model`, including expired ones.
    pub async fn physical_len(&self, model: ModelName) -> usize {
        self.collection(model).read().await.records.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    #[instrument(skip(self, indexes), fields(model = %model))]
    async fn ensure_indexes(&self, model: ModelName, indexes: &[IndexSpec]) -> StoreResult<()> {
        let collection = self.collection(model);
        let mut guard = collection.write().await;
        for spec in indexes.iter().filter(|spec| spec.unique) {
            if let IndexField::Payload(field) = spec.field
                && !guard.unique_fields.contains(&field)
            {
                guard.unique_fields.push(field);
            }
        }
        debug!(unique = ?guard.unique_fields, "Collection ready");
        Ok(())
    }

    async fn find(&self, model: ModelName, id: &str) -> StoreResult<Option<StoredRecord>> {
        let collection = self.collection(model);
        let guard = collection.read().await;
        Ok(guard.live(id, OffsetDateTime::now_utc()).cloned())
    }

    async fn find_by_field(
        &self,
        model: ModelName,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        let now = OffsetDateTime::now_utc();
        let collection = self.collection(model);
        let guard = collection.read().await;
        Ok(guard
            .records
            .values()
            .filter(|r| !r.is_expired_at(now))
            .find(|r| payload_text(&r.payload, field).as_deref() == Some(value))
            .cloned())
    }

    async fn upsert(&self, model: ModelName, record: StoredRecord) -> StoreResult<()> {
        let now = OffsetDateTime::now_utc();
        let collection = self.collection(model);
        let mut guard = collection.write().await;
        guard.check_unique(model, &record, now)?;
        guard.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn consume(&self, model: ModelName, id: &str, at: OffsetDateTime) -> StoreResult<()> {
        let now = OffsetDateTime::now_utc();
        let collection = self.collection(model);
        let mut guard = collection.write().await;
        if let Some(record) = guard.records.get_mut(id).filter(|r| !r.is_expired_at(now)) {
            record
                .payload
                .insert(CONSUMED_FIELD.to_string(), consumed_stamp(at).into());
        }
        Ok(())
    }

    async fn destroy(&self, model: ModelName, id: &str) -> StoreResult<()> {
        let collection = self.collection(model);
        collection.write().await.records.remove(id);
        Ok(())
    }

    async fn delete_by_field(
        &self,
        model: ModelName,
        field: &str,
        value: &str,
    ) -> StoreResult<u64> {
        let collection = self.collection(model);
        let mut guard = collection.write().await;
        let before = guard.records.len();
        guard
            .records
            .retain(|_, r| payload_text(&r.payload, field).as_deref() != Some(value));
        Ok((before - guard.records.len()) as u64)
    }

    async fn purge_expired(&self, model: ModelName) -> StoreResult<u64> {
        let now = OffsetDateTime::now_utc();
        let collection = self.collection(model);
        let mut guard = collection.write().await;
        let before = guard.records.len();
        guard.records.retain(|_, r| !r.is_expired_at(now));
        Ok((before - guard.records.len()) as u64)
    }
}
