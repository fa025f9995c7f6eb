//! Storage infrastructure - PostgreSQL pool and schema migrations

pub mod migrations;
mod postgres;

pub use migrations::{Migration, PostgresMigrator, account_migrations, run_account_migrations};
pub use postgres::{PostgresConfig, connect_pool};
