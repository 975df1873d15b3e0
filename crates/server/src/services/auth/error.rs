//! Authentication error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::lockout::LockoutError;
use crate::services::verification::VerificationError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] crave_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    ///
    /// `remaining_attempts` is set for login failures.
    #[error("invalid credentials")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    /// Too many failures on this account.
    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    /// Too many failures site-wide.
    #[error("login temporarily disabled until {until}")]
    GlobalLocked { until: DateTime<Utc> },

    /// The account was deactivated by an administrator.
    #[error("account disabled")]
    AccountDisabled,

    /// Login attempted before the email address was confirmed.
    #[error("email not verified")]
    EmailNotVerified,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// A submitted field failed validation.
    #[error("{0}")]
    InvalidInput(String),

    /// An emailed code was rejected.
    #[error("{0}")]
    InvalidCode(#[from] VerificationError),

    /// A backup code was not recognized or already used.
    #[error("invalid backup code")]
    InvalidBackupCode,

    /// The second factor was submitted without a pending login.
    #[error("no sign-in is waiting for a second factor")]
    NoPendingTwoFactor,

    /// Enabling 2FA when it is already on.
    #[error("two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    /// Disabling or managing 2FA when it is off.
    #[error("two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    /// Lockout bookkeeping failed.
    #[error("lockout error: {0}")]
    Lockout(#[from] LockoutError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// `InvalidCredentials` without an attempt count.
    #[must_use]
    pub const fn invalid_credentials() -> Self {
        Self::InvalidCredentials {
            remaining_attempts: None,
        }
    }
}
