//! In-memory account store implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::DomainError;
use crate::domain::user::{
    AccountStore, AccountTransaction, Department, InsertedUser, NewUser, PasswordCredential,
    RoleAssignmentStore, RoleId, TransactionMode, UserAccount, UserChanges, UserFilter, UserId,
    UserStore, Validity,
};

/// Store operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    InsertUser,
    UpdateUser,
    UpdateValidity,
    DeleteRoleAssignments,
    InsertRoleAssignments,
    Commit,
}

#[derive(Debug, Clone)]
struct StoredUser {
    id: UserId,
    username: String,
    credential: PasswordCredential,
    email: Option<String>,
    mobile: Option<String>,
    validity: Validity,
    dept_id: Option<i64>,
    created_by: Option<String>,
    modified_by: Option<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct AccountTables {
    users: BTreeMap<UserId, StoredUser>,
    departments: HashMap<i64, Department>,
    assignments: BTreeSet<(UserId, RoleId)>,
    last_id: i64,
}

impl AccountTables {
    fn project(&self, user: &StoredUser) -> UserAccount {
        UserAccount {
            id: user.id,
            username: user.username.clone(),
            credential: user.credential.clone(),
            email: user.email.clone(),
            mobile: user.mobile.clone(),
            validity: user.validity,
            dept_id: user.dept_id,
            department: user
                .dept_id
                .and_then(|dept_id| self.departments.get(&dept_id).cloned()),
            created_by: user.created_by.clone(),
            modified_by: user.modified_by.clone(),
            created_at: user.created_at,
            modified_at: user.modified_at,
        }
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }
}

/// In-memory implementation of AccountStore
///
/// Transactions are serialized behind one async mutex. Each works on a copy
/// of the tables that replaces the shared state only on commit.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountStore {
    tables: Arc<Mutex<AccountTables>>,
    failure: Arc<RwLock<Option<StoreOperation>>>,
    commit_delay: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryAccountStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with departments users can reference
    pub fn with_departments(departments: Vec<Department>) -> Self {
        let tables = AccountTables {
            departments: departments.into_iter().map(|d| (d.id, d)).collect(),
            ..Default::default()
        };

        Self {
            tables: Arc::new(Mutex::new(tables)),
            ..Default::default()
        }
    }

    /// Make the given operation fail in transactions opened from now on
    pub async fn fail_on(&self, operation: Option<StoreOperation>) {
        *self.failure.write().await = operation;
    }

    /// Hold back the acknowledgement of read-write commits; the committed
    /// state is already visible to other transactions while the caller waits
    pub async fn delay_commit_ack(&self, delay: Option<Duration>) {
        *self.commit_delay.write().await = delay;
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn begin(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn AccountTransaction>, DomainError> {
        let failure = *self.failure.read().await;
        let commit_delay = *self.commit_delay.read().await;
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            mode,
            failure,
            commit_delay,
        }))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<AccountTables>,
    working: AccountTables,
    mode: TransactionMode,
    failure: Option<StoreOperation>,
    commit_delay: Option<Duration>,
}

impl InMemoryTransaction {
    fn check(&self, operation: StoreOperation) -> Result<(), DomainError> {
        if self.mode == TransactionMode::ReadOnly && operation != StoreOperation::Commit {
            return Err(DomainError::storage(
                "Cannot write inside a read-only transaction",
            ));
        }

        if self.failure == Some(operation) {
            return Err(DomainError::storage(format!(
                "Injected failure during {:?}",
                operation
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryTransaction {
    async fn insert_user(&mut self, user: &NewUser) -> Result<InsertedUser, DomainError> {
        self.check(StoreOperation::InsertUser)?;

        if self.working.username_taken(&user.username, None) {
            return Err(DomainError::conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }

        self.working.last_id += 1;
        let id = UserId::new(self.working.last_id)
            .map_err(|e| DomainError::internal(e.to_string()))?;

        self.working.users.insert(
            id,
            StoredUser {
                id,
                username: user.username.clone(),
                credential: user.credential.clone(),
                email: user.email.clone(),
                mobile: user.mobile.clone(),
                validity: user.validity,
                dept_id: user.dept_id,
                created_by: user.created_by.clone(),
                modified_by: user.created_by.clone(),
                created_at: user.created_at,
                modified_at: user.created_at,
            },
        );

        Ok(InsertedUser {
            id,
            rows_affected: 1,
        })
    }

    async fn update_user(&mut self, changes: &UserChanges) -> Result<u64, DomainError> {
        self.check(StoreOperation::UpdateUser)?;

        if !self.working.users.contains_key(&changes.id) {
            return Ok(0);
        }

        if self.working.username_taken(&changes.username, Some(changes.id)) {
            return Err(DomainError::conflict(format!(
                "Username '{}' already exists",
                changes.username
            )));
        }

        let Some(user) = self.working.users.get_mut(&changes.id) else {
            return Ok(0);
        };

        user.username = changes.username.clone();
        user.email = changes.email.clone();
        user.mobile = changes.mobile.clone();
        user.dept_id = changes.dept_id;
        user.modified_by = changes.modified_by.clone();
        user.modified_at = changes.modified_at;

        Ok(1)
    }

    async fn find_user_with_department_by_id(
        &mut self,
        id: UserId,
    ) -> Result<Option<UserAccount>, DomainError> {
        Ok(self
            .working
            .users
            .get(&id)
            .map(|user| self.working.project(user)))
    }

    async fn update_validity(
        &mut self,
        id: UserId,
        validity: Validity,
        modified_by: &str,
    ) -> Result<u64, DomainError> {
        self.check(StoreOperation::UpdateValidity)?;

        match self.working.users.get_mut(&id) {
            Some(user) => {
                user.validity = validity;
                user.modified_by = Some(modified_by.to_string());
                user.modified_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count_users_by_filter(&mut self, filter: &UserFilter) -> Result<u64, DomainError> {
        let count = self
            .working
            .users
            .values()
            .filter(|u| filter.matches(&u.username))
            .count();

        Ok(count as u64)
    }

    async fn find_users_page(
        &mut self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<UserAccount>, DomainError> {
        // BTreeMap iteration is already id ascending
        let records = self
            .working
            .users
            .values()
            .filter(|u| filter.matches(&u.username))
            .skip(offset as usize)
            .take(limit as usize)
            .map(|u| self.working.project(u))
            .collect();

        Ok(records)
    }
}

#[async_trait]
impl RoleAssignmentStore for InMemoryTransaction {
    async fn delete_role_assignments_by_user_id(
        &mut self,
        id: UserId,
    ) -> Result<u64, DomainError> {
        self.check(StoreOperation::DeleteRoleAssignments)?;

        let before = self.working.assignments.len();
        self.working.assignments.retain(|(user_id, _)| *user_id != id);

        Ok((before - self.working.assignments.len()) as u64)
    }

    async fn insert_role_assignments(
        &mut self,
        id: UserId,
        role_ids: &[RoleId],
    ) -> Result<u64, DomainError> {
        self.check(StoreOperation::InsertRoleAssignments)?;

        if !self.working.users.contains_key(&id) {
            return Err(DomainError::storage(format!(
                "Cannot assign roles to missing user {}",
                id
            )));
        }

        let inserted = role_ids
            .iter()
            .filter(|role_id| self.working.assignments.insert((id, **role_id)))
            .count();

        Ok(inserted as u64)
    }

    async fn find_role_ids_by_user_id(&mut self, id: UserId) -> Result<Vec<RoleId>, DomainError> {
        Ok(self
            .working
            .assignments
            .iter()
            .filter(|(user_id, _)| *user_id == id)
            .map(|(_, role_id)| *role_id)
            .collect())
    }
}

#[async_trait]
impl AccountTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.check(StoreOperation::Commit)?;

        let InMemoryTransaction {
            mut guard,
            working,
            mode,
            commit_delay,
            ..
        } = *self;
        *guard = working;
        drop(guard);

        if let (TransactionMode::ReadWrite, Some(delay)) = (mode, commit_delay) {
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            credential: PasswordCredential::new("salt", "hash"),
            email: None,
            mobile: None,
            validity: Validity::Enabled,
            dept_id: Some(1),
            created_by: Some("admin".to_string()),
            created_at: Utc::now(),
        }
    }

    fn roles(raw: &[i64]) -> Vec<RoleId> {
        RoleId::set_from(raw).unwrap()
    }

    fn store() -> InMemoryAccountStore {
        InMemoryAccountStore::with_departments(vec![Department::new(1, "Engineering")])
    }

    #[tokio::test]
    async fn test_insert_and_find_with_department() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        let inserted = tx.insert_user(&new_user("alice")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(inserted.id.value(), 1);
        assert_eq!(inserted.rows_affected, 1);

        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        let user = tx
            .find_user_with_department_by_id(inserted.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.department, Some(Department::new(1, "Engineering")));
    }

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let store = store();

        {
            let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
            tx.insert_user(&new_user("alice")).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        let count = tx.count_users_by_filter(&UserFilter::default()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_explicit_rollback() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        tx.insert_user(&new_user("alice")).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        let count = tx.count_users_by_filter(&UserFilter::default()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_username_uniqueness() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        tx.insert_user(&new_user("alice")).await.unwrap();
        let result = tx.insert_user(&new_user("alice")).await;

        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        let result = tx.insert_user(&new_user("alice")).await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_replace_role_assignments() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        let id = tx.insert_user(&new_user("alice")).await.unwrap().id;
        tx.insert_role_assignments(id, &roles(&[1, 2])).await.unwrap();

        let deleted = tx.delete_role_assignments_by_user_id(id).await.unwrap();
        assert_eq!(deleted, 2);

        tx.insert_role_assignments(id, &roles(&[3])).await.unwrap();
        let role_ids = tx.find_role_ids_by_user_id(id).await.unwrap();
        assert_eq!(role_ids, roles(&[3]));
    }

    #[tokio::test]
    async fn test_assign_roles_to_missing_user_fails() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        let result = tx
            .insert_role_assignments(UserId::new(99).unwrap(), &roles(&[1]))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_user_affects_nothing() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        let changes = UserChanges {
            id: UserId::new(5).unwrap(),
            username: "ghost".to_string(),
            email: None,
            mobile: None,
            dept_id: None,
            modified_by: None,
            modified_at: Utc::now(),
        };

        assert_eq!(tx.update_user(&changes).await.unwrap(), 0);
        assert_eq!(
            tx.update_validity(changes.id, Validity::Disabled, "admin")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_page_window_is_id_ordered() {
        let store = store();

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        for name in ["carol", "alice", "bob", "dave", "alan"] {
            tx.insert_user(&new_user(name)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        let filter = UserFilter::by_username(Some("a"));

        assert_eq!(tx.count_users_by_filter(&filter).await.unwrap(), 4);

        let page = tx.find_users_page(&filter, 1, 2).await.unwrap();
        let names: Vec<&str> = page.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "dave"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = store();
        store.fail_on(Some(StoreOperation::InsertRoleAssignments)).await;

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        let id = tx.insert_user(&new_user("alice")).await.unwrap().id;
        let result = tx.insert_role_assignments(id, &roles(&[1])).await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_delayed_commit_ack_is_already_visible() {
        let store = store();
        store
            .delay_commit_ack(Some(Duration::from_millis(500)))
            .await;

        let mut tx = store.begin(TransactionMode::ReadWrite).await.unwrap();
        tx.insert_user(&new_user("alice")).await.unwrap();
        let ack = tokio::time::timeout(Duration::from_millis(20), tx.commit()).await;
        assert!(ack.is_err());

        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        let count = tx.count_users_by_filter(&UserFilter::default()).await.unwrap();
        assert_eq!(count, 1);
    }
}
