//! Audit trail entries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crave_core::{AuditLogId, UserId};

/// One append-only audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: AuditLogId,
    pub user_id: Option<UserId>,
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Audit action names.
pub mod actions {
    pub const SIGNUP: &str = "signup";
    pub const EMAIL_VERIFIED: &str = "email_verified";
    pub const LOGIN: &str = "login";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGOUT: &str = "logout";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const PASSWORD_CHANGED: &str = "password_changed";
    pub const PASSWORD_RESET: &str = "password_reset";
    pub const TWO_FACTOR_ENABLED: &str = "two_factor_enabled";
    pub const TWO_FACTOR_DISABLED: &str = "two_factor_disabled";
    pub const BACKUP_CODES_REGENERATED: &str = "backup_codes_regenerated";
    pub const BACKUP_CODE_USED: &str = "backup_code_used";
    pub const PROFILE_UPDATED: &str = "profile_updated";
    pub const ORDER_PLACED: &str = "order_placed";
    pub const ORDER_CANCELLED: &str = "order_cancelled";
    pub const ORDER_STATUS_CHANGED: &str = "order_status_changed";
    pub const USER_CREATED: &str = "user_created";
    pub const USER_UPDATED: &str = "user_updated";
    pub const USER_DELETED: &str = "user_deleted";
    pub const LOCKOUT_CLEARED: &str = "lockout_cleared";
    pub const FOOD_CREATED: &str = "food_created";
    pub const FOOD_UPDATED: &str = "food_updated";
    pub const FOOD_DELETED: &str = "food_deleted";
}
