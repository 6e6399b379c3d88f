//! Backend trait implemented by concrete document stores.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Never return a record whose `expires_at` has elapsed, even if it is
//!   still physically present
//! - Make each single-record mutation atomic; no cross-record transactions
//!   are required
//! - Report unique-index conflicts as [`StoreError::ConstraintViolation`]
//! - Return [`StoreError::NotConnected`] when called before a connection exists
//!
//! [`StoreError::ConstraintViolation`]: crate::StoreError::ConstraintViolation
//! [`StoreError::NotConnected`]: crate::StoreError::NotConnected

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StoreResult;
use crate::index::IndexSpec;
use crate::model::{ModelName, StoredRecord};

/// Storage primitives the adapter is built on.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the collection backing `model` if it does not exist.
    ///
    /// Stores that create collections implicitly on first write keep the
    /// default no-op.
    async fn ensure_collection(&self, _model: ModelName) -> StoreResult<()> {
        Ok(())
    }

    /// Apply `indexes` to the collection for `model`.
    ///
    /// Must be idempotent: repeated calls with the same specs are harmless.
    async fn ensure_indexes(&self, model: ModelName, indexes: &[IndexSpec]) -> StoreResult<()>;

    /// Fetch a live record by primary key.
    async fn find(&self, model: ModelName, id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Fetch the first live record whose top-level payload `field` equals `value`.
    async fn find_by_field(
        &self,
        model: ModelName,
        field: &str,
        value: &str,
    ) -> StoreResult<Option<StoredRecord>>;

    /// Insert or fully replace the record with `record.id`.
    async fn upsert(&self, model: ModelName, record: StoredRecord) -> StoreResult<()>;

    /// Stamp `payload.consumed` on a live record; absent ids are ignored.
    async fn consume(&self, model: ModelName, id: &str, at: OffsetDateTime) -> StoreResult<()>;

    /// Delete by primary key; absent ids are ignored.
    async fn destroy(&self, model: ModelName, id: &str) -> StoreResult<()>;

    /// Delete every record whose payload `field` equals `value`.
    ///
    /// Returns the number of records removed.
    async fn delete_by_field(&self, model: ModelName, field: &str, value: &str)
    -> StoreResult<u64>;

    /// Physically remove records whose expiry has elapsed.
    ///
    /// Returns the number of records removed.
    async fn purge_expired(&self, model: ModelName) -> StoreResult<u64>;
}

/// Type alias for a shareable record store.
pub type DynRecordStore = Arc<dyn RecordStore>;
