//! Generation-tagged cache of account lookup bundles
//!
//! Every user id carries a generation counter held in the cache backend.
//! Eviction bumps the counter before deleting the bundle, and bundles are
//! written tagged with the generation observed before their database read.
//! A read only counts as a hit when the stored tag matches the current
//! counter, so a bundle read before a committed write can never be served
//! after it. Processes sharing a Redis backend share the counters too.
//!
//! When a bump fails the id is remembered locally and never served from
//! the cache until a later bump succeeds.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::cache::{Cache, CacheExt, user_cache_key, user_generation_key};
use crate::domain::user::{AccountDetails, UserId};

/// Value stored in the backend under `user_cache:<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAccount {
    pub generation: u64,
    pub details: AccountDetails,
}

/// Best-effort account cache; backend failures degrade to misses
#[derive(Debug, Clone)]
pub struct AccountCache {
    backend: Arc<dyn Cache>,
    unsynced: Arc<RwLock<HashSet<UserId>>>,
    ttl: Duration,
}

impl AccountCache {
    pub fn new(backend: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self {
            backend,
            unsynced: Arc::new(RwLock::new(HashSet::new())),
            ttl,
        }
    }

    /// Current generation for an id; read this before loading from the store
    ///
    /// `None` means the generation is unknown and nothing may be cached.
    pub async fn generation(&self, id: UserId) -> Option<u64> {
        if !self.resync(id).await {
            return None;
        }

        match self.backend.counter(&user_generation_key(id)).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!(user_id = %id, error = %e, "Account cache generation read failed");
                None
            }
        }
    }

    pub async fn get(&self, id: UserId) -> Option<AccountDetails> {
        let cached: CachedAccount = match self.backend.get(&user_cache_key(id)).await {
            Ok(Some(cached)) => cached,
            Ok(None) => {
                debug!(user_id = %id, "Account cache miss");
                return None;
            }
            Err(e) => {
                warn!(user_id = %id, error = %e, "Account cache read failed, treating as miss");
                return None;
            }
        };

        if self.generation(id).await != Some(cached.generation) {
            debug!(user_id = %id, "Discarding stale account cache entry");
            return None;
        }

        debug!(user_id = %id, "Account cache hit");
        Some(cached.details)
    }

    /// Store a bundle loaded while `generation` was current
    ///
    /// Skipped when the generation was unknown or has moved on since.
    pub async fn put(&self, generation: Option<u64>, details: &AccountDetails) {
        let id = details.user.id;

        let Some(generation) = generation else {
            debug!(user_id = %id, "Skipping cache fill without a known generation");
            return;
        };

        if self.generation(id).await != Some(generation) {
            debug!(user_id = %id, "Skipping cache fill after concurrent eviction");
            return;
        }

        let cached = CachedAccount {
            generation,
            details: details.clone(),
        };

        if let Err(e) = self.backend.set(&user_cache_key(id), &cached, self.ttl).await {
            warn!(user_id = %id, error = %e, "Account cache write failed");
        }
    }

    /// Invalidate any cached bundle for the id
    pub async fn evict(&self, id: UserId) {
        match self.backend.increment(&user_generation_key(id)).await {
            Ok(_) => {
                self.unsynced.write().await.remove(&id);
            }
            Err(e) => {
                warn!(user_id = %id, error = %e, "Account cache generation bump failed");
                self.unsynced.write().await.insert(id);
            }
        }

        match self.backend.delete(&user_cache_key(id)).await {
            Ok(existed) => debug!(user_id = %id, existed, "Evicted account cache entry"),
            Err(e) => warn!(user_id = %id, error = %e, "Account cache delete failed"),
        }
    }

    /// Retry a failed bump; true once the id's counter is trustworthy
    async fn resync(&self, id: UserId) -> bool {
        if !self.unsynced.read().await.contains(&id) {
            return true;
        }

        match self.backend.increment(&user_generation_key(id)).await {
            Ok(_) => {
                self.unsynced.write().await.remove(&id);
                true
            }
            Err(_) => false,
        }
    }
}
