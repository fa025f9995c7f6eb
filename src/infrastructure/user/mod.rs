//! User infrastructure module
//!
//! Credential hashing, the in-memory and PostgreSQL account stores, and the
//! account service that ties them to the cache and the audit sink.

mod password;
mod postgres_repository;
mod repository;
mod service;

pub use password::{Argon2Hasher, HashAlgorithm, HashPolicy, PasswordHasher, hash_password};
pub use postgres_repository::PostgresAccountStore;
pub use repository::{InMemoryAccountStore, StoreOperation};
pub use service::{AccountService, AccountSettings, CreateAccountRequest, UpdateAccountRequest};
