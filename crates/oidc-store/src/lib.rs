//! Persistence adapter for short-lived OIDC artifacts.
//!
//! Stores access tokens, authorization codes, refresh tokens, device codes,
//! sessions, grants and the engine's other models as opaque documents, one
//! collection per model, on behalf of an external authorization engine.
//!
//! The crate owns the lifecycle contract:
//!
//! - per-model index bookkeeping, performed exactly once per process
//!   ([`ModelRegistry`], [`index::indexes_for`])
//! - TTL expiry: records past `expires_at` are never returned
//! - unique secondary keys (`payload.userCode`, `payload.uid`)
//! - grant-scoped cascading revocation
//! - idempotent consumption stamping
//!
//! Concrete stores implement [`RecordStore`]:
//!
//! - `oidc-store-postgres` - PostgreSQL backend
//! - `oidc-store-memory` - in-process backend
//!
//! # Example
//!
//! ```ignore
//! use oidc_store::{Adapter, AdapterConfig, AdapterFactory, DisconnectedPolicy, ModelName};
//!
//! let factory = AdapterFactory::new(store, AdapterConfig::new(DisconnectedPolicy::FailFast));
//! factory.ensure_all().await;
//!
//! let codes = factory.adapter(ModelName::DeviceCode);
//! codes.upsert("dc1", payload, Some(600)).await?;
//! let found = codes.find_by_user_code("WDJB-MJHT").await?;
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod registry;
pub mod store;
pub mod sweeper;

pub use adapter::{Adapter, AdapterFactory, DynAdapter, StorageAdapter};
pub use config::{AdapterConfig, ConfigError, DisconnectedPolicy};
pub use error::{StoreError, StoreResult};
pub use index::{IndexField, IndexSpec};
pub use model::{ModelName, Payload, StoredRecord};
pub use registry::ModelRegistry;
pub use store::{DynRecordStore, RecordStore};
pub use sweeper::ExpirySweeper;
