//! Login lockout commands.
//!
//! # Usage
//!
//! ```bash
//! # Unlock one account
//! crave lockout clear -e someone@example.com
//!
//! # Lift the site-wide lockout
//! crave lockout clear --global
//!
//! # Show what is currently locked
//! crave lockout list
//! ```

use chrono::Utc;
use crave_core::Email;
use crave_server::services::{LockoutError, LockoutPolicy, LockoutService};
use thiserror::Error;

use super::{ConnectError, connect};

/// Errors that can occur during lockout operations.
#[derive(Debug, Error)]
pub enum LockoutCommandError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Either --email or --global is required")]
    NothingToClear,

    #[error(transparent)]
    Lockout(#[from] LockoutError),
}

async fn service() -> Result<LockoutService, ConnectError> {
    let (config, pool) = connect().await?;
    Ok(LockoutService::new(pool, LockoutPolicy::from(config.lockout)))
}

/// Clear the lockout of one account or the global lockout.
///
/// # Errors
///
/// Returns an error for a malformed email or a database failure.
pub async fn clear(email: Option<&str>, global: bool) -> Result<(), LockoutCommandError> {
    let email = email
        .map(Email::parse)
        .transpose()
        .map_err(|e| LockoutCommandError::InvalidEmail(e.to_string()))?;
    if email.is_none() && !global {
        return Err(LockoutCommandError::NothingToClear);
    }

    let lockout = service().await?;

    if let Some(email) = email {
        if lockout.clear(email.as_str()).await? {
            tracing::info!("Cleared lockout for {}", email);
        } else {
            tracing::info!("No failed logins recorded for {}", email);
        }
    }
    if global {
        if lockout.clear_global().await? {
            tracing::info!("Cleared the global lockout");
        } else {
            tracing::info!("No global lockout recorded");
        }
    }
    Ok(())
}

/// Log every currently locked key.
///
/// # Errors
///
/// Returns an error if the records cannot be read.
pub async fn list() -> Result<(), LockoutCommandError> {
    let lockout = service().await?;
    let locked = lockout.locked(Utc::now()).await?;

    if locked.is_empty() {
        tracing::info!("Nothing is locked");
    }
    for record in locked {
        tracing::info!(
            key = %record.key,
            failed_count = record.failed_count,
            locked_until = ?record.locked_until,
            "Locked"
        );
    }
    Ok(())
}
