//! Transactional store contracts for user rows and role assignments

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{NewUser, RoleId, UserAccount, UserChanges, UserId, Validity};
use crate::domain::DomainError;

/// Access mode requested when opening a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Filter applied when counting and paging users
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Case-sensitive substring of the username; `None` matches every user
    pub username: Option<String>,
}

impl UserFilter {
    pub fn by_username(fragment: Option<&str>) -> Self {
        Self {
            username: fragment.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn matches(&self, username: &str) -> bool {
        match &self.username {
            Some(fragment) => username.contains(fragment.as_str()),
            None => true,
        }
    }
}

/// Outcome of inserting a user row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedUser {
    pub id: UserId,
    pub rows_affected: u64,
}

/// User row operations, run inside the enclosing transaction
#[async_trait]
pub trait UserStore: Send {
    /// Insert a user row; the store assigns the id
    async fn insert_user(&mut self, user: &NewUser) -> Result<InsertedUser, DomainError>;

    /// Update profile fields of an existing user, locking the row until the
    /// transaction ends. Returns the number of rows affected.
    async fn update_user(&mut self, changes: &UserChanges) -> Result<u64, DomainError>;

    async fn find_user_with_department_by_id(
        &mut self,
        id: UserId,
    ) -> Result<Option<UserAccount>, DomainError>;

    async fn update_validity(
        &mut self,
        id: UserId,
        validity: Validity,
        modified_by: &str,
    ) -> Result<u64, DomainError>;

    async fn count_users_by_filter(&mut self, filter: &UserFilter) -> Result<u64, DomainError>;

    /// Fetch a window of matching users ordered by id ascending
    async fn find_users_page(
        &mut self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<UserAccount>, DomainError>;
}

/// User-role link operations, run inside the enclosing transaction
#[async_trait]
pub trait RoleAssignmentStore: Send {
    async fn delete_role_assignments_by_user_id(&mut self, id: UserId)
    -> Result<u64, DomainError>;

    async fn insert_role_assignments(
        &mut self,
        id: UserId,
        role_ids: &[RoleId],
    ) -> Result<u64, DomainError>;

    /// Role ids assigned to the user, ascending
    async fn find_role_ids_by_user_id(&mut self, id: UserId) -> Result<Vec<RoleId>, DomainError>;
}

/// An open transaction spanning both stores
///
/// Dropping the handle without committing rolls the transaction back.
#[async_trait]
pub trait AccountTransaction: UserStore + RoleAssignmentStore {
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// Entry point to the transactional store
#[async_trait]
pub trait AccountStore: Send + Sync + Debug {
    async fn begin(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn AccountTransaction>, DomainError>;
}
