//! Back-office account management.
//!
//! Administrators cannot demote, deactivate or delete their own account, so
//! the last admin cannot lock everyone out by accident. Any change that
//! invalidates what a session carries (role, active flag, deletion) revokes
//! the user's live sessions.

use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crave_core::{Email, UserId, UserRole};

use super::auth::{hash_password, validate_password};
use super::error::{ServiceError, clean_text};
use crate::db::{AttemptRecord, AuditRepository, RepositoryError, UserRepository};
use crate::models::audit::{AuditEntry, actions};
use crate::models::user::{NewUser, User};
use crate::services::lockout::LockoutService;
use crate::services::session_monitor::SessionRegistry;

const MAX_NAME_LENGTH: usize = 100;

/// Fields an administrator may change on an account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Admin user management service.
pub struct AdminUserService<'a> {
    users: UserRepository<'a>,
    audit: AuditRepository<'a>,
    lockout: &'a LockoutService,
    sessions: &'a SessionRegistry,
}

impl<'a> AdminUserService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a SqlitePool,
        lockout: &'a LockoutService,
        sessions: &'a SessionRegistry,
    ) -> Self {
        Self {
            users: UserRepository::new(pool),
            audit: AuditRepository::new(pool),
            lockout,
            sessions,
        }
    }

    /// List accounts, optionally searching email and name.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn list(
        &self,
        search: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<User>, ServiceError> {
        Ok(self.users.list(search, limit).await?)
    }

    /// Get one account.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the user doesn't exist.
    pub async fn get(&self, id: UserId) -> Result<User, ServiceError> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    /// Create an account with the given role. It starts out verified.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a bad email, `ServiceError::Auth`
    /// for a weak password and `ServiceError::Conflict` for a taken email.
    pub async fn create(
        &self,
        actor: UserId,
        email: &str,
        password: &str,
        role: UserRole,
        full_name: Option<&str>,
    ) -> Result<User, ServiceError> {
        let email = Email::parse(email).map_err(|e| ServiceError::Validation(e.to_string()))?;
        validate_password(password)?;
        let full_name = match full_name {
            Some(name) => clean_text("full name", name, MAX_NAME_LENGTH, false)?,
            None => None,
        };

        let user = self
            .users
            .create(&NewUser {
                email,
                password_hash: hash_password(password)?,
                role,
                full_name,
                email_verified: true,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    ServiceError::Conflict("email is already registered".to_owned())
                }
                other => other.into(),
            })?;

        self.audit
            .record(
                Some(actor),
                actions::USER_CREATED,
                &format!("user_id={} role={role}", user.id),
            )
            .await?;
        tracing::info!(user_id = %user.id, %role, "Account created by admin");
        Ok(user)
    }

    /// Change role and/or active flag.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` when an admin demotes or deactivates
    /// themselves and `ServiceError::NotFound` for an unknown user.
    pub async fn update(
        &self,
        actor: UserId,
        id: UserId,
        changes: UserChanges,
    ) -> Result<User, ServiceError> {
        if actor == id {
            if changes.role.is_some_and(|r| !r.is_admin()) {
                return Err(ServiceError::Forbidden(
                    "you cannot remove your own admin role".to_owned(),
                ));
            }
            if changes.is_active == Some(false) {
                return Err(ServiceError::Forbidden(
                    "you cannot deactivate your own account".to_owned(),
                ));
            }
        }

        let before = self.get(id).await?;
        let mut details = Vec::new();

        if let Some(role) = changes.role
            && role != before.role
        {
            self.users
                .update_role(id, role)
                .await
                .map_err(ServiceError::not_found("user"))?;
            details.push(format!("role={role}"));
        }
        if let Some(active) = changes.is_active
            && active != before.is_active
        {
            self.users
                .set_active(id, active)
                .await
                .map_err(ServiceError::not_found("user"))?;
            details.push(format!("active={active}"));
        }

        if details.is_empty() {
            return Ok(before);
        }

        let revoked = self.sessions.end_all_for_user(id).await;
        self.audit
            .record(
                Some(actor),
                actions::USER_UPDATED,
                &format!("user_id={id} {}", details.join(" ")),
            )
            .await?;
        tracing::info!(user_id = %id, changes = %details.join(" "), revoked, "Account updated by admin");

        self.get(id).await
    }

    /// Delete an account.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` for the caller's own account.
    pub async fn delete(&self, actor: UserId, id: UserId) -> Result<(), ServiceError> {
        if actor == id {
            return Err(ServiceError::Forbidden(
                "you cannot delete your own account".to_owned(),
            ));
        }

        let user = self.get(id).await?;
        self.users
            .delete(id)
            .await
            .map_err(ServiceError::not_found("user"))?;
        self.sessions.end_all_for_user(id).await;
        self.lockout.clear(user.email.as_str()).await?;

        self.audit
            .record(
                Some(actor),
                actions::USER_DELETED,
                &format!("user_id={id} email={}", user.email.masked()),
            )
            .await?;
        tracing::info!(user_id = %id, "Account deleted by admin");
        Ok(())
    }

    /// Unlock an account. Returns whether a lockout record existed.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed email.
    pub async fn clear_lockout(&self, actor: UserId, email: &str) -> Result<bool, ServiceError> {
        let email = Email::parse(email).map_err(|e| ServiceError::Validation(e.to_string()))?;
        let cleared = self.lockout.clear(email.as_str()).await?;

        self.audit
            .record(
                Some(actor),
                actions::LOCKOUT_CLEARED,
                &format!("email={} existed={cleared}", email.masked()),
            )
            .await?;
        Ok(cleared)
    }

    /// Lift the global login lockout. Returns whether one was recorded.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Lockout` if the record cannot be removed.
    pub async fn clear_global_lockout(&self, actor: UserId) -> Result<bool, ServiceError> {
        let cleared = self.lockout.clear_global().await?;
        self.audit
            .record(Some(actor), actions::LOCKOUT_CLEARED, "global")
            .await?;
        Ok(cleared)
    }

    /// Accounts (and the global sentinel) currently locked.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Lockout` if the records cannot be read.
    pub async fn locked(&self) -> Result<Vec<AttemptRecord>, ServiceError> {
        Ok(self.lockout.locked(Utc::now()).await?)
    }

    /// Most recent audit entries, optionally for one user.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the query fails.
    pub async fn audit_log(
        &self,
        user_id: Option<UserId>,
        limit: Option<u32>,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        Ok(self.audit.recent(user_id, limit).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::db::create_memory_pool;
    use crate::db::users::tests::insert_user;
    use crate::services::AuthError;
    use crate::services::lockout::LockoutPolicy;

    struct Fixture {
        pool: SqlitePool,
        lockout: LockoutService,
        sessions: SessionRegistry,
        admin: User,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = create_memory_pool().await.unwrap();
            let admin = insert_user(&pool, "boss@example.com", UserRole::Admin).await;
            Self {
                lockout: LockoutService::new(pool.clone(), LockoutPolicy::default()),
                sessions: SessionRegistry::new(SessionConfig::default()),
                pool,
                admin,
            }
        }

        fn service(&self) -> AdminUserService<'_> {
            AdminUserService::new(&self.pool, &self.lockout, &self.sessions)
        }
    }

    #[tokio::test]
    async fn test_create_is_verified_and_unique() {
        let fx = Fixture::new().await;
        let admin = fx.service();

        let staff = admin
            .create(fx.admin.id, "staff@example.com", "kitchen42", UserRole::Admin, Some(" Kim "))
            .await
            .unwrap();
        assert!(staff.email_verified);
        assert_eq!(staff.role, UserRole::Admin);
        assert_eq!(staff.full_name.as_deref(), Some("Kim"));

        assert!(matches!(
            admin
                .create(fx.admin.id, "STAFF@example.com", "kitchen42", UserRole::Customer, None)
                .await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            admin
                .create(fx.admin.id, "weak@example.com", "short", UserRole::Customer, None)
                .await,
            Err(ServiceError::Auth(AuthError::WeakPassword(_)))
        ));
        assert!(matches!(
            admin
                .create(fx.admin.id, "not-an-email", "kitchen42", UserRole::Customer, None)
                .await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cannot_demote_deactivate_or_delete_self() {
        let fx = Fixture::new().await;
        let admin = fx.service();
        let me = fx.admin.id;

        let demote = UserChanges {
            role: Some(UserRole::Customer),
            ..UserChanges::default()
        };
        assert!(matches!(
            admin.update(me, me, demote).await,
            Err(ServiceError::Forbidden(_))
        ));
        let deactivate = UserChanges {
            is_active: Some(false),
            ..UserChanges::default()
        };
        assert!(matches!(
            admin.update(me, me, deactivate).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(admin.delete(me, me).await, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_deactivate_revokes_sessions() {
        let fx = Fixture::new().await;
        let admin = fx.service();
        let customer = insert_user(&fx.pool, "eater@example.com", UserRole::Customer).await;
        let token = fx.sessions.start(customer.id).await;

        let updated = admin
            .update(
                fx.admin.id,
                customer.id,
                UserChanges {
                    is_active: Some(false),
                    role: Some(UserRole::Customer),
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert!(fx.sessions.status(token).await.is_none());

        let log = admin.audit_log(None, Some(1)).await.unwrap();
        assert_eq!(log[0].action, actions::USER_UPDATED);
        assert!(log[0].details.ends_with("active=false"));
    }

    #[tokio::test]
    async fn test_delete_and_lockout_clear() {
        let fx = Fixture::new().await;
        let admin = fx.service();
        let customer = insert_user(&fx.pool, "eater@example.com", UserRole::Customer).await;

        for _ in 0..5 {
            fx.lockout
                .record_failure("eater@example.com", Utc::now())
                .await
                .unwrap();
        }
        assert_eq!(
            admin
                .locked()
                .await
                .unwrap()
                .iter()
                .filter(|r| r.key == "eater@example.com")
                .count(),
            1
        );
        assert!(admin.clear_lockout(fx.admin.id, "Eater@example.com").await.unwrap());
        assert!(!admin.clear_lockout(fx.admin.id, "eater@example.com").await.unwrap());

        admin.delete(fx.admin.id, customer.id).await.unwrap();
        assert!(matches!(
            admin.get(customer.id).await,
            Err(ServiceError::NotFound("user"))
        ));
        assert!(matches!(
            admin.delete(fx.admin.id, customer.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
