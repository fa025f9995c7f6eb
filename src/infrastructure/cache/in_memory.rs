//! Process-local cache backed by moka

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use crate::domain::DomainError;
use crate::domain::cache::Cache;

/// Configuration for the in-memory cache
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of account entries kept
    pub max_capacity: u64,
    /// Upper bound on entry lifetime, regardless of the per-entry TTL
    pub max_ttl: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            max_ttl: Duration::from_secs(3600),
        }
    }
}

impl InMemoryCacheConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory cache with per-entry TTL
///
/// Counters are kept outside moka so capacity eviction and TTL never reset them.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: MokaCache<String, CacheEntry>,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.max_ttl)
            .build();

        Self {
            entries,
            counters: Mutex::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> DomainError {
    DomainError::cache("Counter lock poisoned")
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        match self.entries.get(key).await {
            Some(entry) if entry.is_expired() => {
                self.entries.invalidate(key).await;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data)),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let entry = CacheEntry {
            data: value.to_string(),
            expires_at: Instant::now() + ttl,
        };

        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self
            .entries
            .remove(key)
            .await
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn counter(&self, key: &str) -> Result<u64, DomainError> {
        let counters = self.counters.lock().map_err(poisoned)?;
        Ok(counters.get(key).copied().unwrap_or_default())
    }

    async fn increment(&self, key: &str) -> Result<u64, DomainError> {
        let mut counters = self.counters.lock().map_err(poisoned)?;
        let counter = counters.entry(key.to_string()).or_default();
        *counter = counter.wrapping_add(1);
        Ok(*counter)
    }
}
