//! Pool construction for [`crate::ConnectionManager`].

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

/// Pool options specialised to PostgreSQL.
pub type PgPoolOptions = PoolOptions<Postgres>;

/// Connection lifetime when the config leaves it unset.
const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Translate `config` into pool options without connecting.
///
/// # Errors
///
/// Returns [`PostgresError::Config`] for a zero `pool_size`.
pub fn pool_options(config: &PostgresConfig) -> Result<PgPoolOptions> {
    if config.pool_size == 0 {
        return Err(PostgresError::config("pool_size must be at least 1"));
    }

    let idle = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .clamp(1, config.pool_size);
    let lifetime = config
        .max_lifetime_secs
        .map_or(DEFAULT_MAX_LIFETIME, Duration::from_secs);

    Ok(PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(idle)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(lifetime)
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
        .test_before_acquire(false))
}

/// Open the pool; fails unless the first connection succeeds.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let options = pool_options(config)?;
    info!(max = config.pool_size, "Opening PostgreSQL pool");

    let pool = options
        .connect(&config.url)
        .await
        .map_err(PostgresError::Connection)?;
    debug!(size = pool.size(), "PostgreSQL pool open");
    Ok(pool)
}

/// Run `SELECT 1` on a pooled connection.
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx_core::query::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Replace the password in a connection URL with `****`.
#[must_use]
pub fn mask_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((credentials, host)) => match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:****@{host}{tail}"),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://oidc:s3cr3t@db:5432/oidc?sslmode=require"),
            "postgres://oidc:****@db:5432/oidc?sslmode=require"
        );
        assert_eq!(
            mask_password("postgres://db:5432/oidc"),
            "postgres://db:5432/oidc"
        );
        assert_eq!(
            mask_password("postgres://oidc@db/oidc"),
            "postgres://oidc@db/oidc"
        );
        assert_eq!(mask_password("not a url"), "not a url");
    }

    #[test]
    fn test_pool_options_from_config() {
        let options = pool_options(
            &PostgresConfig::new("postgres://db/oidc")
                .with_pool_size(8)
                .with_connect_timeout_ms(1500)
                .with_idle_timeout_ms(None),
        )
        .unwrap();
        assert_eq!(options.get_max_connections(), 8);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_acquire_timeout(), Duration::from_millis(1500));
        assert_eq!(options.get_max_lifetime(), Some(DEFAULT_MAX_LIFETIME));
        assert_eq!(options.get_idle_timeout(), None);

        let options = pool_options(
            &PostgresConfig::new("postgres://db/oidc")
                .with_pool_size(2)
                .with_min_connections(Some(5)),
        )
        .unwrap();
        assert_eq!(options.get_min_connections(), 2);
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let config = PostgresConfig::new("postgres://db/oidc").with_pool_size(0);
        assert!(matches!(
            pool_options(&config),
            Err(PostgresError::Config { .. })
        ));
    }
}
