//! Domain layer - Core business logic and entities

pub mod audit;
pub mod cache;
pub mod error;
pub mod pagination;
pub mod user;

pub use audit::{AuditAction, AuditEvent, AuditSink};
pub use cache::{Cache, CacheExt};
pub use error::DomainError;
pub use pagination::PageResult;
pub use user::{
    AccountDetails, AccountStore, AccountTransaction, CreatedAccount, Department, NewUser,
    PasswordCredential, RoleAssignmentStore, RoleId, TransactionMode, UserAccount, UserChanges,
    UserFilter, UserId, UserStore, UserValidationError, Validity,
};
