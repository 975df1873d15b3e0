//! Session-related types.
//!
//! Types stored in the cookie session for authentication state.

use serde::{Deserialize, Serialize};

use crave_core::{Email, UserId, UserRole};

use crate::services::session_monitor::SessionToken;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user and the
/// watchdog entry tracking their idle time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Role at login time.
    pub role: UserRole,
    /// Idle-timeout registry entry for this login.
    pub token: SessionToken,
}

/// A login that passed the password check and awaits its second factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTwoFactor {
    pub user_id: UserId,
    pub email: Email,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for a login waiting on its 2FA code.
    pub const PENDING_TWO_FACTOR: &str = "pending_two_factor";
}
