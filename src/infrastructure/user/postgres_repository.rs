//! PostgreSQL account store implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::DomainError;
use crate::domain::user::{
    AccountStore, AccountTransaction, Department, InsertedUser, NewUser, PasswordCredential,
    RoleAssignmentStore, RoleId, TransactionMode, UserAccount, UserChanges, UserFilter, UserId,
    UserStore, Validity,
};

const SELECT_USER_WITH_DEPARTMENT: &str = r#"
    SELECT u.id, u.username, u.password, u.salt, u.email, u.mobile, u.valid, u.dept_id,
           u.created_user, u.modified_user, u.created_time, u.modified_time,
           d.name AS dept_name
    FROM sys_users u
    LEFT JOIN sys_depts d ON d.id = u.dept_id
"#;

/// PostgreSQL implementation of AccountStore
#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    /// Create a new store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn begin(
        &self,
        mode: TransactionMode,
    ) -> Result<Box<dyn AccountTransaction>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        let characteristics = match mode {
            TransactionMode::ReadOnly => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED, READ ONLY",
            TransactionMode::ReadWrite => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
        };

        sqlx::query(characteristics)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to configure transaction: {}", e))
            })?;

        Ok(Box::new(PostgresAccountTransaction { tx }))
    }
}

struct PostgresAccountTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UserStore for PostgresAccountTransaction {
    async fn insert_user(&mut self, user: &NewUser) -> Result<InsertedUser, DomainError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sys_users (username, password, salt, email, mobile, valid, dept_id,
                                   created_user, modified_user, created_time, modified_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $9)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(user.credential.password_hash())
        .bind(user.credential.salt())
        .bind(&user.email)
        .bind(&user.mobile)
        .bind(user.validity.as_flag())
        .bind(user.dept_id)
        .bind(&user.created_by)
        .bind(user.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, "create user", &user.username))?;

        let id = UserId::new(id)
            .map_err(|e| DomainError::storage(format!("Invalid user ID from database: {}", e)))?;

        Ok(InsertedUser {
            id,
            rows_affected: 1,
        })
    }

    async fn update_user(&mut self, changes: &UserChanges) -> Result<u64, DomainError> {
        // The UPDATE holds the row lock until commit, covering the role replacement
        let result = sqlx::query(
            r#"
            UPDATE sys_users
            SET username = $2, email = $3, mobile = $4, dept_id = $5,
                modified_user = $6, modified_time = $7
            WHERE id = $1
            "#,
        )
        .bind(changes.id.value())
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.mobile)
        .bind(changes.dept_id)
        .bind(&changes.modified_by)
        .bind(changes.modified_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, "update user", &changes.username))?;

        Ok(result.rows_affected())
    }

    async fn find_user_with_department_by_id(
        &mut self,
        id: UserId,
    ) -> Result<Option<UserAccount>, DomainError> {
        let sql = format!("{} WHERE u.id = $1", SELECT_USER_WITH_DEPARTMENT);

        let row = sqlx::query(&sql)
            .bind(id.value())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get user: {}", e)))?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn update_validity(
        &mut self,
        id: UserId,
        validity: Validity,
        modified_by: &str,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE sys_users
            SET valid = $2, modified_user = $3, modified_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.value())
        .bind(validity.as_flag())
        .bind(modified_by)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update validity: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn count_users_by_filter(&mut self, filter: &UserFilter) -> Result<u64, DomainError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sys_users
            WHERE ($1::TEXT IS NULL OR strpos(username, $1) > 0)
            "#,
        )
        .bind(&filter.username)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count users: {}", e)))?;

        Ok(count as u64)
    }

    async fn find_users_page(
        &mut self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<UserAccount>, DomainError> {
        let sql = format!(
            "{} WHERE ($1::TEXT IS NULL OR strpos(u.username, $1) > 0) \
             ORDER BY u.id ASC LIMIT $2 OFFSET $3",
            SELECT_USER_WITH_DEPARTMENT
        );

        let rows = sqlx::query(&sql)
            .bind(&filter.username)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list users: {}", e)))?;

        rows.iter().map(row_to_account).collect()
    }
}

#[async_trait]
impl RoleAssignmentStore for PostgresAccountTransaction {
    async fn delete_role_assignments_by_user_id(
        &mut self,
        id: UserId,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM sys_user_roles WHERE user_id = $1")
            .bind(id.value())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to delete role assignments: {}", e))
            })?;

        Ok(result.rows_affected())
    }

    async fn insert_role_assignments(
        &mut self,
        id: UserId,
        role_ids: &[RoleId],
    ) -> Result<u64, DomainError> {
        let raw: Vec<i64> = role_ids.iter().map(|r| r.value()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO sys_user_roles (user_id, role_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id.value())
        .bind(&raw)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to insert role assignments: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn find_role_ids_by_user_id(&mut self, id: UserId) -> Result<Vec<RoleId>, DomainError> {
        let raw: Vec<i64> = sqlx::query_scalar(
            "SELECT role_id FROM sys_user_roles WHERE user_id = $1 ORDER BY role_id",
        )
        .bind(id.value())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get role ids: {}", e)))?;

        raw.into_iter()
            .map(|r| {
                RoleId::new(r).map_err(|e| {
                    DomainError::storage(format!("Invalid role ID in database: {}", e))
                })
            })
            .collect()
    }
}

#[async_trait]
impl AccountTransaction for PostgresAccountTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let Self { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        let Self { tx } = *self;
        tx.rollback()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to roll back transaction: {}", e)))
    }
}

fn map_write_error(e: sqlx::Error, action: &str, username: &str) -> DomainError {
    let unique_violation = e
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);

    if unique_violation {
        DomainError::conflict(format!("Username '{}' already exists", username))
    } else {
        DomainError::storage(format!("Failed to {}: {}", action, e))
    }
}

fn storage_column<'r, T>(row: &'r PgRow, column: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| DomainError::storage(format!("Failed to read column '{}': {}", column, e)))
}

fn row_to_account(row: &PgRow) -> Result<UserAccount, DomainError> {
    let id: i64 = storage_column(row, "id")?;
    let valid: i16 = storage_column(row, "valid")?;
    let dept_id: Option<i64> = storage_column(row, "dept_id")?;
    let dept_name: Option<String> = storage_column(row, "dept_name")?;
    let password_hash: String = storage_column(row, "password")?;
    let salt: String = storage_column(row, "salt")?;
    let created_at: DateTime<Utc> = storage_column(row, "created_time")?;
    let modified_at: DateTime<Utc> = storage_column(row, "modified_time")?;

    let id = UserId::new(id)
        .map_err(|e| DomainError::storage(format!("Invalid user ID in database: {}", e)))?;
    let validity = Validity::try_from(i32::from(valid))
        .map_err(|e| DomainError::storage(format!("Invalid validity in database: {}", e)))?;

    let department = match (dept_id, dept_name) {
        (Some(dept_id), Some(name)) => Some(Department::new(dept_id, name)),
        _ => None,
    };

    Ok(UserAccount {
        id,
        username: storage_column(row, "username")?,
        credential: PasswordCredential::new(salt, password_hash),
        email: storage_column(row, "email")?,
        mobile: storage_column(row, "mobile")?,
        validity,
        dept_id,
        department,
        created_by: storage_column(row, "created_user")?,
        modified_by: storage_column(row, "modified_user")?,
        created_at,
        modified_at,
    })
}
