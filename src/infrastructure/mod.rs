//! Infrastructure layer - Store, cache, audit and logging implementations

pub mod audit;
pub mod cache;
pub mod logging;
pub mod storage;
pub mod user;
