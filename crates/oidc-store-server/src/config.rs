use oidc_store::AdapterConfig;
use oidc_store_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Adapter behaviour. `on_disconnected` has no default and must be set.
    pub store: AdapterConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate().map_err(|e| format!("store: {e}"))?;
        if self.postgres.url.trim().is_empty() {
            return Err("postgres.url must not be empty".into());
        }
        if self.postgres.pool_size == 0 {
            return Err("postgres.pool_size must be > 0".into());
        }
        if self.postgres.connect_timeout_ms == 0 {
            return Err("postgres.connect_timeout_ms must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

pub mod loader {
    use std::path::PathBuf;

    use anyhow::{Context, anyhow};
    use config::{Config, Environment, File};

    use super::ServerConfig;

    /// File read when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "oidc-store.toml";

    /// Load configuration from an optional TOML file overlaid with
    /// `OIDC_STORE__<SECTION>__<KEY>` environment variables.
    pub fn load_config(path: Option<&str>) -> anyhow::Result<ServerConfig> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // e.g. OIDC_STORE__POSTGRES__URL=postgres://...
        builder = builder.add_source(
            Environment::with_prefix("OIDC_STORE")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: ServerConfig = builder
            .build()
            .context("config build error")?
            .try_deserialize()
            .context("config deserialize error")?;
        merged.validate().map_err(|e| anyhow!(e))?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use oidc_store::DisconnectedPolicy;

    use super::*;

    fn sample() -> ServerConfig {
        ServerConfig {
            store: AdapterConfig::new(DisconnectedPolicy::FailFast),
            postgres: PostgresConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = sample();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));

        let mut cfg = sample();
        cfg.postgres.url = " ".into();
        assert!(cfg.validate().unwrap_err().contains("postgres.url"));

        let mut cfg = sample();
        cfg.store = cfg
            .store
            .with_sweep_interval(std::time::Duration::from_millis(10));
        assert!(cfg.validate().unwrap_err().starts_with("store:"));
    }
}
