//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crave_core::{Email, UserId, UserRole};

/// A Crave account.
///
/// The password hash and backup-code digests never leave the repository layer.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub role: UserRole,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name to greet the user with in emails.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.local_part())
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub role: UserRole,
    pub full_name: Option<String>,
    pub email_verified: bool,
}

/// Editable profile fields. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}
