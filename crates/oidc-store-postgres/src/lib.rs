//! PostgreSQL backend for oidc-store.
//!
//! One table per model with a JSONB payload column, expression indexes for
//! payload lookups and unique keys, and a live-row filter for TTL expiry.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use oidc_store::{AdapterConfig, AdapterFactory, DisconnectedPolicy};
//! use oidc_store_postgres::{ConnectionManager, PostgresConfig, PostgresRecordStore};
//!
//! let connection = Arc::new(ConnectionManager::new(PostgresConfig::new(url)));
//! connection.init().await?;
//! let store = Arc::new(PostgresRecordStore::new(connection.clone()));
//! let factory = AdapterFactory::new(store, AdapterConfig::new(DisconnectedPolicy::FailFast));
//! factory.ensure_all().await;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod schema;
pub mod store;

pub use config::PostgresConfig;
pub use connection::ConnectionManager;
pub use error::{PostgresError, Result};
pub use pool::{create_pool, mask_password};
pub use schema::SchemaManager;
pub use store::PostgresRecordStore;
