//! User account entities and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{UserValidationError, validate_user_id};

/// User identifier - positive integer assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct UserId(i64);

impl UserId {
    /// Create a new UserId after validation
    pub fn new(id: i64) -> Result<Self, UserValidationError> {
        validate_user_id(id)?;
        Ok(Self(id))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for UserId {
    type Error = UserValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role identifier - positive integer owned by the role catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RoleId(i64);

impl RoleId {
    pub fn new(id: i64) -> Result<Self, UserValidationError> {
        if id < 1 {
            return Err(UserValidationError::NonPositiveRoleId(id));
        }
        Ok(Self(id))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Sort and de-duplicate raw role ids into a role set
    pub fn set_from(raw: &[i64]) -> Result<Vec<RoleId>, UserValidationError> {
        let mut ids = raw
            .iter()
            .map(|id| RoleId::new(*id))
            .collect::<Result<Vec<_>, _>>()?;

        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

impl TryFrom<i64> for RoleId {
    type Error = UserValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleId> for i64 {
    fn from(id: RoleId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an account may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Disabled,
    #[default]
    Enabled,
}

impl Validity {
    /// Storage flag: 1 for enabled, 0 for disabled
    pub fn as_flag(&self) -> i16 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl TryFrom<i32> for Validity {
    type Error = UserValidationError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Enabled),
            other => Err(UserValidationError::InvalidValidity(other)),
        }
    }
}

/// Department a user belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
}

impl Department {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Salted password hash; salt and hash are only ever written together
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCredential {
    salt: String,
    password_hash: String,
}

impl PasswordCredential {
    pub fn new(salt: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            password_hash: password_hash.into(),
        }
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

impl std::fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredential")
            .field("salt", &self.salt)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// User row joined with its department
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub credential: PasswordCredential,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub validity: Validity,
    pub dept_id: Option<i64>,
    pub department: Option<Department>,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A user row ready to be inserted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub credential: PasswordCredential,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub validity: Validity,
    pub dept_id: Option<i64>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Field changes applied to an existing user row; never touches the credential
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub dept_id: Option<i64>,
    pub modified_by: Option<String>,
    pub modified_at: DateTime<Utc>,
}

/// Result of an account lookup: the user plus its assigned role ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDetails {
    pub user: UserAccount,
    pub role_ids: Vec<RoleId>,
}

/// Result of creating an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreatedAccount {
    pub id: UserId,
    pub rows_affected: u64,
}
