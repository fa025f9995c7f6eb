//! Cache key layout

use crate::domain::user::UserId;

/// Namespace for single-account lookups
const USER_CACHE_NAMESPACE: &str = "user_cache";

/// Namespace for per-user cache generations
const USER_GENERATION_NAMESPACE: &str = "user_cache_gen";

/// Key for the cached lookup bundle of one user
pub fn user_cache_key(id: UserId) -> String {
    format!("{}:{}", USER_CACHE_NAMESPACE, id)
}

/// Key for the generation counter guarding one user's bundle
pub fn user_generation_key(id: UserId) -> String {
    format!("{}:{}", USER_GENERATION_NAMESPACE, id)
}
