//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the first administrator (prompts nothing; pass the password explicitly)
//! crave user create -e admin@example.com -p 'S3cure-pass' -r admin -n "Head Chef"
//! ```
//!
//! Accounts created here are already email-verified.

use crave_core::{Email, UserRole};
use crave_server::db::{AuditRepository, RepositoryError, UserRepository};
use crave_server::models::audit::actions;
use crave_server::models::user::NewUser;
use crave_server::services::AuthError;
use crave_server::services::auth::{hash_password, validate_password};
use thiserror::Error;

use super::{ConnectError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserCommandError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: customer, admin")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password rejected or could not be hashed.
    #[error("{0}")]
    Password(#[from] AuthError),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Create a verified user.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns an error for an invalid email, role or password, or a taken email.
pub async fn create(
    email: &str,
    password: &str,
    role: &str,
    name: Option<&str>,
) -> Result<i64, UserCommandError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserCommandError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|e| UserCommandError::InvalidEmail(e.to_string()))?;
    validate_password(password)?;

    let (_, pool) = connect().await?;
    let users = UserRepository::new(&pool);

    if users.get_by_email(&email).await?.is_some() {
        return Err(UserCommandError::UserExists(email.into_inner()));
    }

    tracing::info!("Creating user: {} ({})", email, role);
    let user = users
        .create(&NewUser {
            email,
            password_hash: hash_password(password)?,
            role,
            full_name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_owned),
            email_verified: true,
        })
        .await?;

    AuditRepository::new(&pool)
        .record(
            Some(user.id),
            actions::USER_CREATED,
            &format!("role={role} via=cli"),
        )
        .await?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(user.id.as_i64())
}
