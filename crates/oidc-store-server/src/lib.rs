//! Standalone host for the PostgreSQL-backed OIDC artifact store.
//!
//! Loads configuration, opens the shared connection, prepares every model
//! collection and runs the expiry sweeper until shut down. Embedders take
//! adapters from [`app::StoreService::factory`].

pub mod app;
pub mod config;
pub mod observability;

pub use app::StoreService;
pub use config::ServerConfig;
