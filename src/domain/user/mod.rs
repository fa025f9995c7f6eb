//! User domain
//!
//! Domain types for user accounts and their role assignments, input
//! validation, and the transactional store contracts the account service
//! runs against.

mod entity;
mod repository;
mod validation;

pub use entity::{
    AccountDetails, CreatedAccount, Department, NewUser, PasswordCredential, RoleId, UserAccount,
    UserChanges, UserId, Validity,
};
pub use repository::{
    AccountStore, AccountTransaction, InsertedUser, RoleAssignmentStore, TransactionMode,
    UserFilter, UserStore,
};
pub use validation::{
    validate_page_current, validate_password, validate_role_ids, validate_user_id,
    validate_username, UserValidationError,
};
