//! Cache infrastructure - Cache implementations

mod account_cache;
mod factory;
mod in_memory;
mod redis;

pub use account_cache::{AccountCache, CachedAccount};
pub use factory::{CacheConfig, CacheFactory, CacheType};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis::{RedisCache, RedisCacheConfig};
