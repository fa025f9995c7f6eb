//! User validation utilities

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur during user validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UserValidationError {
    #[error("User ID must be a positive integer, got {0}")]
    NonPositiveId(i64),

    #[error("Role ID must be a positive integer, got {0}")]
    NonPositiveRoleId(i64),

    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username exceeds maximum length of {0} characters")]
    UsernameTooLong(usize),

    #[error("Password cannot be empty")]
    EmptyPassword,

    #[error("Password exceeds maximum length of {0} characters")]
    PasswordTooLong(usize),

    #[error("At least one role must be assigned to the user")]
    MissingRoles,

    #[error("Validity flag must be 0 or 1, got {0}")]
    InvalidValidity(i32),

    #[error("Page number must be at least 1, got {0}")]
    InvalidPage(i64),
}

impl From<UserValidationError> for DomainError {
    fn from(err: UserValidationError) -> Self {
        match err {
            UserValidationError::NonPositiveId(_) => DomainError::invalid_id(err.to_string()),
            _ => DomainError::validation(err.to_string()),
        }
    }
}

const MAX_USERNAME_LENGTH: usize = 50;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Validate a user ID (must be >= 1)
pub fn validate_user_id(id: i64) -> Result<(), UserValidationError> {
    if id < 1 {
        return Err(UserValidationError::NonPositiveId(id));
    }

    Ok(())
}

/// Validate a username
///
/// Rules:
/// - Cannot be empty
/// - Maximum 50 characters
pub fn validate_username(username: &str) -> Result<(), UserValidationError> {
    if username.is_empty() {
        return Err(UserValidationError::EmptyUsername);
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UserValidationError::UsernameTooLong(MAX_USERNAME_LENGTH));
    }

    Ok(())
}

/// Validate a plaintext password before hashing
///
/// The error never echoes the password back.
pub fn validate_password(password: &str) -> Result<(), UserValidationError> {
    if password.is_empty() {
        return Err(UserValidationError::EmptyPassword);
    }

    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(UserValidationError::PasswordTooLong(MAX_PASSWORD_LENGTH));
    }

    Ok(())
}

/// Validate the role ids requested for an account
///
/// Rules:
/// - At least one role id
/// - Every role id must be positive
pub fn validate_role_ids(role_ids: &[i64]) -> Result<(), UserValidationError> {
    if role_ids.is_empty() {
        return Err(UserValidationError::MissingRoles);
    }

    if let Some(bad) = role_ids.iter().find(|id| **id < 1) {
        return Err(UserValidationError::NonPositiveRoleId(*bad));
    }

    Ok(())
}

/// Validate a 1-based page number
pub fn validate_page_current(page_current: i64) -> Result<(), UserValidationError> {
    if page_current < 1 {
        return Err(UserValidationError::InvalidPage(page_current));
    }

    Ok(())
}
