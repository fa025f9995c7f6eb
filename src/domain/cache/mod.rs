//! Cache domain - Generic caching abstraction layer

mod key;
mod repository;

pub use key::{user_cache_key, user_generation_key};
pub use repository::{Cache, CacheExt};

#[cfg(test)]
pub use repository::mock::MockCache;
