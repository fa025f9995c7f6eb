//! User Account Core
//!
//! Account management for an administrative back office:
//! - Salted, iterated SHA-2 credential hashing
//! - Transactional user and role-assignment persistence (in-memory or PostgreSQL)
//! - A read-through account cache that stays coherent with committed writes
//! - Paginated account listing with an audit trail

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;
use tracing::info;

use crate::config::{CacheSettings, StorageBackend, StorageSettings};
use domain::AccountStore;
use infrastructure::audit::TracingAuditSink;
use infrastructure::cache::{AccountCache, CacheConfig, CacheFactory};
use infrastructure::storage::{PostgresConfig, connect_pool, run_account_migrations};
use infrastructure::user::{
    AccountService, AccountSettings, Argon2Hasher, HashPolicy, InMemoryAccountStore,
    PostgresAccountStore,
};

/// Account service over whichever store the configuration selects
pub type DynAccountService = AccountService<dyn AccountStore, Argon2Hasher>;

/// Wire the account service from configuration
pub async fn build_account_service(config: &AppConfig) -> anyhow::Result<DynAccountService> {
    let store = build_store(&config.storage).await?;

    let hasher = Argon2Hasher::new(HashPolicy::new(
        config.accounts.hash_algorithm,
        config.accounts.hash_iterations,
        config.accounts.hash_memory_kib,
    ))
    .context("Invalid hashing configuration")?;

    let cache_config = cache_config(&config.cache)?;
    let backend = CacheFactory::new()
        .create(&cache_config)
        .await
        .context("Failed to create account cache")?;

    if config.accounts.page_size == 0 {
        anyhow::bail!("accounts.page_size must be at least 1");
    }

    let settings = AccountSettings {
        page_size: config.accounts.page_size,
        transaction_timeout: Duration::from_secs(config.accounts.transaction_timeout_secs),
    };

    info!(
        storage = ?config.storage.backend,
        cache = %cache_config.cache_type,
        hash_algorithm = %hasher.policy().algorithm,
        page_size = settings.page_size,
        "Account service ready"
    );

    Ok(AccountService::new(
        store,
        Arc::new(hasher),
        AccountCache::new(backend, cache_config.ttl),
        Arc::new(TracingAuditSink::new()),
        settings,
    ))
}

/// Open the PostgreSQL pool described by the storage settings
pub async fn connect_postgres(settings: &StorageSettings) -> anyhow::Result<PgPool> {
    let url = settings
        .database_url
        .clone()
        .context("storage.database_url is required for the postgres backend")?;

    let pool = connect_pool(
        &PostgresConfig::new(url)
            .with_max_connections(settings.max_connections)
            .with_min_connections(settings.min_connections)
            .with_connect_timeout(settings.connect_timeout_secs),
    )
    .await?;

    Ok(pool)
}

async fn build_store(settings: &StorageSettings) -> anyhow::Result<Arc<dyn AccountStore>> {
    match settings.backend {
        StorageBackend::Memory => {
            info!("Using in-memory account store");
            Ok(Arc::new(InMemoryAccountStore::new()))
        }
        StorageBackend::Postgres => {
            let pool = connect_postgres(settings).await?;

            if settings.run_migrations {
                let applied = run_account_migrations(&pool).await?;
                info!(applied, "Account migrations complete");
            }

            Ok(Arc::new(PostgresAccountStore::new(pool)))
        }
    }
}

fn cache_config(settings: &CacheSettings) -> anyhow::Result<CacheConfig> {
    Ok(CacheConfig {
        cache_type: settings.backend.parse()?,
        redis_url: settings.redis_url.clone(),
        key_prefix: settings.key_prefix.clone(),
        ttl: Duration::from_secs(settings.ttl_secs),
        max_capacity: settings.max_capacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::cache::CacheType;
    use crate::infrastructure::user::CreateAccountRequest;

    #[tokio::test]
    async fn test_build_default_service() {
        let service = build_account_service(&AppConfig::default()).await.unwrap();

        let created = service
            .create_account(CreateAccountRequest::new("alice", "pw123"), &[1])
            .await
            .unwrap();
        let details = service.find_account_by_id(created.id.value()).await.unwrap();

        assert_eq!(details.user.username, "alice");
        assert_eq!(service.settings().page_size, 3);
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        let mut config = AppConfig::default();
        config.accounts.page_size = 0;

        assert!(build_account_service(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Postgres;

        let err = build_account_service(&config).await.unwrap_err();
        assert!(err.to_string().contains("database_url"));
    }

    #[test]
    fn test_cache_config_mapping() {
        let settings = CacheSettings {
            backend: "redis".to_string(),
            redis_url: Some("redis://cache:6379".to_string()),
            ttl_secs: 120,
            ..Default::default()
        };

        let config = cache_config(&settings).unwrap();
        assert_eq!(config.cache_type, CacheType::Redis);
        assert_eq!(config.ttl, Duration::from_secs(120));

        let bad = CacheSettings {
            backend: "memcached".to_string(),
            ..Default::default()
        };
        assert!(cache_config(&bad).is_err());
    }
}
