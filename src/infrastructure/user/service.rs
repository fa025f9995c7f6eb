//! Account service: validation, hashing, transactions, cache coherence and audit

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::DomainError;
use crate::domain::audit::{AuditAction, AuditEvent, AuditSink};
use crate::domain::pagination::{PageResult, page_count, page_offset};
use crate::domain::user::{
    AccountDetails, AccountStore, AccountTransaction, CreatedAccount, NewUser, RoleId,
    TransactionMode, UserAccount, UserChanges, UserFilter, UserId, Validity,
    validate_page_current, validate_password, validate_role_ids, validate_username,
};
use crate::infrastructure::cache::AccountCache;

use super::password::PasswordHasher;

/// Request for creating a new account
#[derive(Clone, Default)]
pub struct CreateAccountRequest {
    pub username: String,
    /// Plaintext; hashed before anything is stored
    pub password: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub dept_id: Option<i64>,
    pub created_by: Option<String>,
}

impl CreateAccountRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_department(mut self, dept_id: i64) -> Self {
        self.dept_id = Some(dept_id);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }
}

impl fmt::Debug for CreateAccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateAccountRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("mobile", &self.mobile)
            .field("dept_id", &self.dept_id)
            .field("created_by", &self.created_by)
            .finish()
    }
}

/// Request for updating an existing account; the password is not part of it
#[derive(Debug, Clone, Default)]
pub struct UpdateAccountRequest {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub dept_id: Option<i64>,
    pub modified_by: Option<String>,
}

impl UpdateAccountRequest {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_department(mut self, dept_id: i64) -> Self {
        self.dept_id = Some(dept_id);
        self
    }

    pub fn modified_by(mut self, actor: impl Into<String>) -> Self {
        self.modified_by = Some(actor.into());
        self
    }
}

/// Tunables for the account service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSettings {
    /// Records per page in `list_accounts`
    pub page_size: u64,
    /// Deadline for each transactional section, including `begin`
    pub transaction_timeout: Duration,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            page_size: 3,
            transaction_timeout: Duration::from_secs(30),
        }
    }
}

/// Account service
///
/// Every operation validates its input first, then runs its storage work
/// inside one transaction bounded by the configured deadline. Writes that
/// change a cached bundle evict it once their transaction has ended, whatever
/// the outcome.
#[derive(Debug)]
pub struct AccountService<S: AccountStore + ?Sized, H: PasswordHasher + ?Sized> {
    store: Arc<S>,
    hasher: Arc<H>,
    cache: AccountCache,
    audit: Arc<dyn AuditSink>,
    settings: AccountSettings,
}

impl<S: AccountStore + ?Sized, H: PasswordHasher + ?Sized> AccountService<S, H> {
    /// Create a new account service
    pub fn new(
        store: Arc<S>,
        hasher: Arc<H>,
        cache: AccountCache,
        audit: Arc<dyn AuditSink>,
        settings: AccountSettings,
    ) -> Self {
        Self {
            store,
            hasher,
            cache,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &AccountSettings {
        &self.settings
    }

    /// Look up an account and its role ids, reading through the cache
    pub async fn find_account_by_id(&self, id: i64) -> Result<AccountDetails, DomainError> {
        let id = UserId::new(id)?;

        if let Some(details) = self.cache.get(id).await {
            return Ok(details);
        }

        let generation = self.cache.generation(id).await;

        let details = self
            .with_deadline("find account", async {
                let mut tx = self.store.begin(TransactionMode::ReadOnly).await?;
                let result = load_details(tx.as_mut(), id).await;
                complete(tx, result).await
            })
            .await?;

        self.cache.put(generation, &details).await;
        debug!(user_id = %id, "Loaded account from store");

        Ok(details)
    }

    /// Create an account with a freshly salted credential and its role set
    pub async fn create_account(
        &self,
        request: CreateAccountRequest,
        role_ids: &[i64],
    ) -> Result<CreatedAccount, DomainError> {
        validate_username(&request.username)?;
        validate_password(&request.password)?;
        validate_role_ids(role_ids)?;
        let role_ids = RoleId::set_from(role_ids)?;

        let credential = self.hasher.issue(&request.password)?;

        let user = NewUser {
            username: request.username,
            credential,
            email: request.email,
            mobile: request.mobile,
            validity: Validity::Enabled,
            dept_id: request.dept_id,
            created_by: request.created_by,
            created_at: Utc::now(),
        };

        let created = self
            .with_deadline("create account", async {
                let mut tx = self.store.begin(TransactionMode::ReadWrite).await?;
                let result = insert_account(tx.as_mut(), &user, &role_ids).await;
                complete(tx, result).await
            })
            .await?;

        info!(
            user_id = %created.id,
            username = %user.username,
            roles = role_ids.len(),
            "Created account"
        );

        Ok(created)
    }

    /// Replace an account's fields and its full role set
    pub async fn update_account(
        &self,
        request: UpdateAccountRequest,
        role_ids: &[i64],
    ) -> Result<u64, DomainError> {
        validate_username(&request.username)?;
        validate_role_ids(role_ids)?;
        let role_ids = RoleId::set_from(role_ids)?;
        let id = UserId::new(request.id)?;

        let changes = UserChanges {
            id,
            username: request.username,
            email: request.email,
            mobile: request.mobile,
            dept_id: request.dept_id,
            modified_by: request.modified_by,
            modified_at: Utc::now(),
        };

        let result = self
            .with_deadline("update account", async {
                let mut tx = self.store.begin(TransactionMode::ReadWrite).await?;
                let result = replace_account(tx.as_mut(), &changes, &role_ids).await;
                complete(tx, result).await
            })
            .await;

        // A timed-out commit may still have landed
        self.cache.evict(id).await;
        let rows_affected = result?;
        info!(user_id = %id, roles = role_ids.len(), "Updated account");

        Ok(rows_affected)
    }

    /// Enable (`1`) or disable (`0`) an account
    pub async fn set_validity(
        &self,
        id: i64,
        valid: i32,
        modified_by: &str,
    ) -> Result<u64, DomainError> {
        let id = UserId::new(id)?;
        let validity = Validity::try_from(valid)?;

        let result = self
            .with_deadline("set validity", async {
                let mut tx = self.store.begin(TransactionMode::ReadWrite).await?;
                let result = match tx.update_validity(id, validity, modified_by).await {
                    Ok(0) => Err(DomainError::conflict("record may no longer exist")),
                    other => other,
                };
                complete(tx, result).await
            })
            .await;

        self.cache.evict(id).await;
        let rows_affected = result?;
        info!(user_id = %id, enabled = validity.is_enabled(), "Changed account validity");

        self.emit(
            AuditEvent::new(AuditAction::ChangeValidity)
                .with_actor(modified_by)
                .with_target(id),
        )
        .await;

        Ok(rows_affected)
    }

    /// One page of accounts whose username contains `username_filter`
    pub async fn list_accounts(
        &self,
        username_filter: Option<&str>,
        page_current: i64,
    ) -> Result<PageResult<UserAccount>, DomainError> {
        validate_page_current(page_current)?;
        let page_current = page_current as u64;
        let page_size = self.settings.page_size;
        let filter = UserFilter::by_username(username_filter);

        let page = self
            .with_deadline("list accounts", async {
                let mut tx = self.store.begin(TransactionMode::ReadOnly).await?;
                let result = load_page(tx.as_mut(), &filter, page_current, page_size).await;
                complete(tx, result).await
            })
            .await?;

        debug!(
            page_current,
            row_count = page.row_count,
            records = page.records.len(),
            "Listed accounts"
        );

        self.emit(AuditEvent::new(AuditAction::PageQuery)).await;

        Ok(page)
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, DomainError>>,
    ) -> Result<T, DomainError> {
        let deadline = self.settings.transaction_timeout;

        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = deadline.as_millis() as u64, "Transaction timed out");
                Err(DomainError::timeout(format!(
                    "{} did not finish within {:?}",
                    operation, deadline
                )))
            }
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event).await {
            warn!(action = %event.action, error = %e, "Failed to record audit event");
        }
    }
}

/// Commit on success, roll back on failure
async fn complete<T>(
    tx: Box<dyn AccountTransaction>,
    result: Result<T, DomainError>,
) -> Result<T, DomainError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                warn!(error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}

async fn load_details(
    tx: &mut dyn AccountTransaction,
    id: UserId,
) -> Result<AccountDetails, DomainError> {
    let user = tx
        .find_user_with_department_by_id(id)
        .await?
        .ok_or_else(|| DomainError::not_found("user does not exist"))?;

    let role_ids = tx.find_role_ids_by_user_id(id).await?;

    Ok(AccountDetails { user, role_ids })
}

async fn insert_account(
    tx: &mut dyn AccountTransaction,
    user: &NewUser,
    role_ids: &[RoleId],
) -> Result<CreatedAccount, DomainError> {
    let inserted = tx.insert_user(user).await?;
    tx.insert_role_assignments(inserted.id, role_ids).await?;

    Ok(CreatedAccount {
        id: inserted.id,
        rows_affected: inserted.rows_affected,
    })
}

async fn replace_account(
    tx: &mut dyn AccountTransaction,
    changes: &UserChanges,
    role_ids: &[RoleId],
) -> Result<u64, DomainError> {
    let rows_affected = tx.update_user(changes).await?;
    if rows_affected == 0 {
        return Err(DomainError::conflict("record may no longer exist"));
    }

    tx.delete_role_assignments_by_user_id(changes.id).await?;
    tx.insert_role_assignments(changes.id, role_ids).await?;

    Ok(rows_affected)
}

async fn load_page(
    tx: &mut dyn AccountTransaction,
    filter: &UserFilter,
    page_current: u64,
    page_size: u64,
) -> Result<PageResult<UserAccount>, DomainError> {
    let row_count = tx.count_users_by_filter(filter).await?;
    if row_count == 0 {
        return Err(DomainError::not_found("no records"));
    }

    let last_page = page_count(row_count, page_size);
    if page_current > last_page {
        return Err(DomainError::not_found(format!(
            "page {} is past the last page {}",
            page_current, last_page
        )));
    }

    let records = tx
        .find_users_page(filter, page_offset(page_current, page_size), page_size)
        .await?;

    Ok(PageResult::new(page_current, page_size, row_count, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::{MockAuditSink, RecordingAuditSink};
    use crate::domain::cache::MockCache;
    use crate::domain::user::{Department, RoleAssignmentStore, UserStore};
    use crate::infrastructure::user::password::{
        Argon2Hasher, HashAlgorithm, HashPolicy, hash_password,
    };
    use crate::infrastructure::user::repository::{InMemoryAccountStore, StoreOperation};

    type TestService = AccountService<InMemoryAccountStore, Argon2Hasher>;

    const POLICY: HashPolicy = HashPolicy {
        algorithm: HashAlgorithm::Argon2id,
        iterations: 1,
        memory_kib: 64,
    };

    struct Harness {
        service: TestService,
        store: Arc<InMemoryAccountStore>,
        cache: Arc<MockCache>,
        audit: Arc<RecordingAuditSink>,
    }

    fn harness() -> Harness {
        harness_with(AccountSettings::default(), Arc::new(MockCache::new()))
    }

    fn harness_with(settings: AccountSettings, cache: Arc<MockCache>) -> Harness {
        let store = Arc::new(InMemoryAccountStore::with_departments(vec![
            Department::new(1, "Engineering"),
            Department::new(2, "Sales"),
        ]));
        let hasher = Arc::new(Argon2Hasher::new(POLICY).unwrap());
        let audit = Arc::new(RecordingAuditSink::new());

        let service = AccountService::new(
            store.clone(),
            hasher,
            AccountCache::new(cache.clone(), Duration::from_secs(60)),
            audit.clone(),
            settings,
        );

        Harness {
            service,
            store,
            cache,
            audit,
        }
    }

    fn service_with_audit(audit: MockAuditSink) -> TestService {
        AccountService::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(Argon2Hasher::new(POLICY).unwrap()),
            AccountCache::new(Arc::new(MockCache::new()), Duration::from_secs(60)),
            Arc::new(audit),
            AccountSettings::default(),
        )
    }

    fn alice() -> CreateAccountRequest {
        CreateAccountRequest::new("alice", "pw123")
            .with_department(1)
            .with_email("alice@example.com")
            .created_by("admin")
    }

    async fn seed(service: &TestService, count: usize) {
        for n in 1..=count {
            service
                .create_account(CreateAccountRequest::new(format!("user{}", n), "pw"), &[1])
                .await
                .unwrap();
        }
    }

    async fn stored_role_ids(store: &InMemoryAccountStore, id: i64) -> Vec<i64> {
        let mut tx = store.begin(TransactionMode::ReadOnly).await.unwrap();
        tx.find_role_ids_by_user_id(UserId::new(id).unwrap())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.value())
            .collect()
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let h = harness();

        let created = h.service.create_account(alice(), &[1, 2]).await.unwrap();
        assert_eq!(created.id.value(), 1);
        assert_eq!(created.rows_affected, 1);

        let details = h.service.find_account_by_id(1).await.unwrap();
        let credential = &details.user.credential;

        assert_eq!(details.user.username, "alice");
        assert_eq!(details.user.validity, Validity::Enabled);
        assert_eq!(details.user.department, Some(Department::new(1, "Engineering")));
        assert_eq!(details.role_ids, RoleId::set_from(&[1, 2]).unwrap());
        assert_ne!(credential.password_hash(), "pw123");
        assert_eq!(
            credential.password_hash(),
            hash_password("pw123", credential.salt(), &POLICY).unwrap()
        );
    }

    #[tokio::test]
    async fn test_create_deduplicates_role_ids() {
        let h = harness();

        h.service.create_account(alice(), &[2, 1, 2]).await.unwrap();

        assert_eq!(stored_role_ids(&h.store, 1).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_create_validation_order() {
        let h = harness();

        let err = h
            .service
            .create_account(CreateAccountRequest::new("", ""), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Username"));

        let err = h
            .service
            .create_account(CreateAccountRequest::new("alice", ""), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Password"));

        let err = h
            .service
            .create_account(CreateAccountRequest::new("alice", "pw"), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("role"));

        let err = h
            .service
            .create_account(CreateAccountRequest::new("alice", "pw"), &[1, 0])
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());

        assert!(h.service.list_accounts(None, 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_errors_never_contain_password() {
        let h = harness();
        let request = CreateAccountRequest::new("alice", "s3cret-value");

        assert!(!format!("{:?}", request).contains("s3cret-value"));

        h.service.create_account(request.clone(), &[1]).await.unwrap();
        let err = h.service.create_account(request, &[1]).await.unwrap_err();

        assert!(err.is_conflict());
        assert!(!err.to_string().contains("s3cret-value"));
    }

    #[tokio::test]
    async fn test_create_is_atomic() {
        let h = harness();
        h.store
            .fail_on(Some(StoreOperation::InsertRoleAssignments))
            .await;

        let err = h.service.create_account(alice(), &[1]).await.unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));

        h.store.fail_on(None).await;
        assert!(h.service.list_accounts(None, 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_find_rejects_invalid_id() {
        let h = harness();

        let err = h.service.find_account_by_id(0).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidId { .. }));
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_find_missing_user() {
        let h = harness();

        let err = h.service.find_account_by_id(42).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(h.cache.peek("user_cache:42").is_none());
    }

    #[tokio::test]
    async fn test_second_find_is_served_from_cache() {
        let h = harness();
        h.service.create_account(alice(), &[1]).await.unwrap();

        let first = h.service.find_account_by_id(1).await.unwrap();
        assert!(h.cache.peek("user_cache:1").is_some());

        // Change the row behind the service's back; a cache hit won't see it
        let mut tx = h.store.begin(TransactionMode::ReadWrite).await.unwrap();
        tx.update_validity(UserId::new(1).unwrap(), Validity::Disabled, "dba")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let second = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_reflects_new_fields_and_roles() {
        let h = harness();
        h.service.create_account(alice(), &[1, 2]).await.unwrap();
        let before = h.service.find_account_by_id(1).await.unwrap();

        let rows = h
            .service
            .update_account(
                UpdateAccountRequest::new(1, "alice2")
                    .with_department(2)
                    .modified_by("admin"),
                &[3],
            )
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let after = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(after.user.username, "alice2");
        assert_eq!(after.user.department, Some(Department::new(2, "Sales")));
        assert_eq!(after.user.modified_by.as_deref(), Some("admin"));
        assert_eq!(after.user.credential, before.user.credential);
        assert_eq!(stored_role_ids(&h.store, 1).await, vec![3]);
    }

    #[tokio::test]
    async fn test_update_missing_user_conflicts_without_orphans() {
        let h = harness();

        let err = h
            .service
            .update_account(UpdateAccountRequest::new(7, "ghost"), &[1])
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(stored_role_ids(&h.store, 7).await.is_empty());
    }

    #[tokio::test]
    async fn test_update_validation_order() {
        let h = harness();

        let err = h
            .service
            .update_account(UpdateAccountRequest::new(0, ""), &[1])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = h
            .service
            .update_account(UpdateAccountRequest::new(0, "bob"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = h
            .service
            .update_account(UpdateAccountRequest::new(0, "bob"), &[1])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_state() {
        let h = harness();
        h.service.create_account(alice(), &[1, 2]).await.unwrap();
        h.store
            .fail_on(Some(StoreOperation::InsertRoleAssignments))
            .await;

        let result = h
            .service
            .update_account(UpdateAccountRequest::new(1, "renamed"), &[3])
            .await;
        assert!(result.is_err());

        h.store.fail_on(None).await;
        let details = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(details.user.username, "alice");
        assert_eq!(stored_role_ids(&h.store, 1).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stale_entry_is_not_served_after_update() {
        let h = harness();
        h.service.create_account(alice(), &[1]).await.unwrap();
        h.service.find_account_by_id(1).await.unwrap();
        let stale = h.cache.peek("user_cache:1").unwrap();

        h.service
            .update_account(UpdateAccountRequest::new(1, "alice2"), &[1])
            .await
            .unwrap();

        // A slow reader writes back what it loaded before the update
        h.cache.poke("user_cache:1", &stale);

        let details = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(details.user.username, "alice2");
    }

    #[tokio::test]
    async fn test_set_validity_rejects_bad_input() {
        let h = harness();
        h.service.create_account(alice(), &[1]).await.unwrap();

        let err = h.service.set_validity(1, 2, "admin").await.unwrap_err();
        assert!(err.is_invalid_argument());

        let err = h.service.set_validity(0, 1, "admin").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidId { .. }));

        let err = h.service.set_validity(99, 1, "admin").await.unwrap_err();
        assert!(err.is_conflict());

        assert!(h.audit.events().is_empty());
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let h = harness();

        let created = h.service.create_account(alice(), &[1, 2]).await.unwrap();
        let id = created.id.value();

        h.service
            .update_account(UpdateAccountRequest::new(id, "alice"), &[3])
            .await
            .unwrap();
        h.service.find_account_by_id(id).await.unwrap();
        h.service.set_validity(id, 0, "admin").await.unwrap();

        let details = h.service.find_account_by_id(id).await.unwrap();
        assert_eq!(details.user.validity, Validity::Disabled);
        assert_eq!(details.role_ids, vec![RoleId::new(3).unwrap()]);
        assert_eq!(details.user.modified_by.as_deref(), Some("admin"));

        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::ChangeValidity);
        assert_eq!(events[0].target_id, Some(created.id));
        assert_eq!(events[0].actor_id.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_validity_change_audited_once() {
        let mut audit = MockAuditSink::new();
        audit
            .expect_record()
            .withf(|event| {
                event.action == AuditAction::ChangeValidity
                    && event.target_id.map(|id| id.value()) == Some(1)
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service_with_audit(audit);
        service.create_account(alice(), &[1]).await.unwrap();

        assert_eq!(service.set_validity(1, 0, "admin").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_operation() {
        let mut audit = MockAuditSink::new();
        audit
            .expect_record()
            .returning(|_| Err(DomainError::internal("audit store down")));

        let service = service_with_audit(audit);
        service.create_account(alice(), &[1]).await.unwrap();

        assert!(service.set_validity(1, 1, "admin").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_pages_seven_rows() {
        let h = harness();
        seed(&h.service, 7).await;

        let first = h.service.list_accounts(None, 1).await.unwrap();
        assert_eq!(first.row_count, 7);
        assert_eq!(first.page_count, 3);
        assert_eq!(first.page_size, 3);
        let ids: Vec<i64> = first.records.iter().map(|u| u.id.value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let last = h.service.list_accounts(None, 3).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.page_current, last.page_count);

        assert!(h.service.list_accounts(None, 4).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_pages_six_rows() {
        let h = harness();
        seed(&h.service, 6).await;

        let last = h.service.list_accounts(None, 2).await.unwrap();
        assert_eq!(last.records.len(), 3);
        assert_eq!(last.page_count, 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_username_substring() {
        let h = harness();
        seed(&h.service, 4).await;
        h.service.create_account(alice(), &[1]).await.unwrap();

        let page = h.service.list_accounts(Some("user"), 2).await.unwrap();
        assert_eq!(page.row_count, 4);
        assert_eq!(page.records.len(), 1);

        let page = h.service.list_accounts(Some(""), 1).await.unwrap();
        assert_eq!(page.row_count, 5);

        let err = h.service.list_accounts(Some("USER"), 1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_rejects_bad_page_and_audits() {
        let h = harness();
        seed(&h.service, 1).await;

        let err = h.service.list_accounts(None, 0).await.unwrap_err();
        assert!(err.is_invalid_argument());

        h.service.list_accounts(None, 1).await.unwrap();
        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::PageQuery);
    }

    #[tokio::test]
    async fn test_page_size_from_settings() {
        let settings = AccountSettings {
            page_size: 5,
            ..Default::default()
        };
        let h = harness_with(settings, Arc::new(MockCache::new()));
        seed(&h.service, 7).await;

        let page = h.service.list_accounts(None, 2).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.page_count, 2);
    }

    #[tokio::test]
    async fn test_transaction_timeout() {
        let settings = AccountSettings {
            transaction_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let h = harness_with(settings, Arc::new(MockCache::new()));
        h.service.create_account(alice(), &[1]).await.unwrap();

        let held = h.store.begin(TransactionMode::ReadWrite).await.unwrap();
        let err = h.service.set_validity(1, 0, "admin").await.unwrap_err();
        assert!(matches!(err, DomainError::Timeout { .. }));
        drop(held);

        let details = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(details.user.validity, Validity::Enabled);
    }

    #[tokio::test]
    async fn test_late_commit_ack_still_evicts() {
        let settings = AccountSettings {
            transaction_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let h = harness_with(settings, Arc::new(MockCache::new()));
        h.service.create_account(alice(), &[1]).await.unwrap();
        let cached = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(cached.user.validity, Validity::Enabled);

        // The store applies the write but acknowledges after the deadline
        h.store
            .delay_commit_ack(Some(Duration::from_millis(200)))
            .await;

        let err = h.service.set_validity(1, 0, "admin").await.unwrap_err();
        assert!(matches!(err, DomainError::Timeout { .. }));
        let details = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(details.user.validity, Validity::Disabled);

        let err = h
            .service
            .update_account(UpdateAccountRequest::new(1, "alice2"), &[2])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Timeout { .. }));
        let details = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(details.user.username, "alice2");
        assert_eq!(details.role_ids, vec![RoleId::new(2).unwrap()]);
    }

    #[tokio::test]
    async fn test_failing_cache_is_best_effort() {
        let cache = Arc::new(MockCache::new().with_error("cache offline"));
        let h = harness_with(AccountSettings::default(), cache);

        h.service.create_account(alice(), &[1]).await.unwrap();
        assert_eq!(h.service.find_account_by_id(1).await.unwrap().user.username, "alice");

        h.service
            .update_account(UpdateAccountRequest::new(1, "alice2"), &[2])
            .await
            .unwrap();
        h.service.set_validity(1, 0, "admin").await.unwrap();

        h.cache.set_error(None);
        let details = h.service.find_account_by_id(1).await.unwrap();
        assert_eq!(details.user.username, "alice2");
        assert_eq!(details.user.validity, Validity::Disabled);
    }
}
