//! Authentication service.
//!
//! Password login guarded by lockout, email verification, emailed-code
//! two-factor with backup codes, password reset and change.
//!
//! Login checks run in a fixed order: lockout, password, account active,
//! email verified, then the second factor. A wrong password, an unknown email
//! and a rejected second factor count toward lockout. The failure count is
//! cleared only once the whole login succeeds.

mod error;
pub mod password;

pub use error::AuthError;
pub use password::{hash_password, validate_password, verify_password};

use chrono::Utc;
use sqlx::SqlitePool;

use crave_core::{Email, UserId, UserRole, VerificationPurpose};

use crate::db::{AuditRepository, RepositoryError, UserRepository};
use crate::models::audit::actions;
use crate::models::user::{NewUser, User};
use crate::services::email::EmailService;
use crate::services::lockout::{LockoutService, LockoutStatus};
use crate::services::session_monitor::{SessionRegistry, SessionToken};
use crate::services::two_factor::{digest_backup_code, generate_backup_codes, is_email_code};
use crate::services::verification::{VerificationCodes, VerificationError};

/// Maximum length of a display name.
const MAX_NAME_LENGTH: usize = 100;

/// Result of a password login.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Fully signed in; the token is registered with the session watchdog.
    Authenticated { user: User, token: SessionToken },
    /// Password accepted, a code was emailed, `complete_two_factor` finishes the login.
    TwoFactorRequired { user_id: UserId, email: Email },
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    audit: AuditRepository<'a>,
    lockout: &'a LockoutService,
    codes: &'a VerificationCodes,
    email: &'a EmailService,
    sessions: &'a SessionRegistry,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        pool: &'a SqlitePool,
        lockout: &'a LockoutService,
        codes: &'a VerificationCodes,
        email: &'a EmailService,
        sessions: &'a SessionRegistry,
    ) -> Self {
        Self {
            users: UserRepository::new(pool),
            audit: AuditRepository::new(pool),
            lockout,
            codes,
            email,
            sessions,
        }
    }

    // =========================================================================
    // Registration & Email Verification
    // =========================================================================

    /// Register a new customer account and email a verification code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        let full_name = clean_name(full_name)?;

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(&NewUser {
                email,
                password_hash,
                role: UserRole::Customer,
                full_name,
                email_verified: false,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        self.audit
            .record(Some(user.id), actions::SIGNUP, "")
            .await?;

        let code = self
            .codes
            .issue(&user.email, VerificationPurpose::EmailVerification)
            .await;
        self.send_code(&user, VerificationPurpose::EmailVerification, &code);

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Confirm an email address with the emailed code.
    ///
    /// Already-verified accounts succeed without consuming anything.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCode` if the code is rejected.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Err(VerificationError::NotFound.into());
        };
        if user.email_verified {
            return Ok(user);
        }

        self.codes
            .verify(&email, VerificationPurpose::EmailVerification, code)
            .await?;
        self.users.mark_email_verified(user.id).await?;
        self.audit
            .record(Some(user.id), actions::EMAIL_VERIFIED, "")
            .await?;

        if let Err(e) = self.email.send_welcome(&user.email, user.display_name()) {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send welcome email");
        }

        Ok(User {
            email_verified: true,
            ..user
        })
    }

    /// Send a new verification code.
    ///
    /// Unknown or already-verified addresses succeed silently.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCode(ResendTooSoon)` inside the resend cooldown.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await? else {
            return Ok(());
        };
        if user.email_verified {
            return Ok(());
        }

        let code = self
            .codes
            .reissue(&email, VerificationPurpose::EmailVerification)
            .await?;
        self.send_code(&user, VerificationPurpose::EmailVerification, &code);
        Ok(())
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountLocked` / `GlobalLocked` while locked out.
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AccountDisabled` for deactivated accounts.
    /// Returns `AuthError::EmailNotVerified` (and sends a fresh code) for unverified accounts.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = Email::parse(email)?;
        let key = email.as_str();

        match self.lockout.check(key, Utc::now()).await? {
            LockoutStatus::Open => {}
            LockoutStatus::AccountLocked { until } => return Err(AuthError::AccountLocked { until }),
            LockoutStatus::GlobalLocked { until } => return Err(AuthError::GlobalLocked { until }),
        }

        let credentials = self.users.get_credentials(&email).await?;
        let user = match credentials {
            Some((user, hash)) if verify_password(password, &hash).is_ok() => user,
            other => {
                let user_id = other.map(|(u, _)| u.id);
                return Err(self.login_failed(&email, user_id).await?);
            }
        };

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login refused for disabled account");
            return Err(AuthError::AccountDisabled);
        }

        if !user.email_verified {
            match self
                .codes
                .reissue(&user.email, VerificationPurpose::EmailVerification)
                .await
            {
                Ok(code) => self.send_code(&user, VerificationPurpose::EmailVerification, &code),
                Err(e) => tracing::debug!(user_id = %user.id, reason = %e, "Verification code not resent"),
            }
            return Err(AuthError::EmailNotVerified);
        }

        if user.two_factor_enabled {
            // Inside the resend cooldown the code already in the inbox stays valid.
            match self
                .codes
                .reissue(&user.email, VerificationPurpose::TwoFactor)
                .await
            {
                Ok(code) => self.send_code(&user, VerificationPurpose::TwoFactor, &code),
                Err(e) => tracing::debug!(user_id = %user.id, reason = %e, "Two-factor code not resent"),
            }
            tracing::info!(user_id = %user.id, "Login awaiting second factor");
            return Ok(LoginOutcome::TwoFactorRequired {
                user_id: user.id,
                email: user.email,
            });
        }

        let token = self.finish_login(&user, "password").await?;
        Ok(LoginOutcome::Authenticated { user, token })
    }

    /// Record a failed login and build the error to return.
    async fn login_failed(
        &self,
        email: &Email,
        user_id: Option<UserId>,
    ) -> Result<AuthError, AuthError> {
        let outcome = self
            .lockout
            .record_failure(email.as_str(), Utc::now())
            .await?;

        self.audit
            .record(user_id, actions::LOGIN_FAILED, &email.masked())
            .await?;
        tracing::info!(
            email = %email.masked(),
            remaining_attempts = outcome.remaining_attempts,
            "Login failed"
        );

        Ok(match outcome.status {
            LockoutStatus::Open => AuthError::InvalidCredentials {
                remaining_attempts: Some(outcome.remaining_attempts),
            },
            LockoutStatus::AccountLocked { until } => AuthError::AccountLocked { until },
            LockoutStatus::GlobalLocked { until } => AuthError::GlobalLocked { until },
        })
    }

    /// Finish a login that passed the password step with a 2FA code or backup code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCode` / `InvalidBackupCode` if the code is
    /// rejected, and `AuthError::AccountLocked` / `GlobalLocked` once rejected
    /// codes have used up the lockout allowance.
    pub async fn complete_two_factor(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<(User, SessionToken), AuthError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        match self.lockout.check(user.email.as_str(), Utc::now()).await? {
            LockoutStatus::Open => {}
            LockoutStatus::AccountLocked { until } => return Err(AuthError::AccountLocked { until }),
            LockoutStatus::GlobalLocked { until } => return Err(AuthError::GlobalLocked { until }),
        }

        let method = if is_email_code(code) {
            if let Err(e) = self
                .codes
                .verify(&user.email, VerificationPurpose::TwoFactor, code.trim())
                .await
            {
                return Err(self.second_factor_failed(&user, e.into()).await?);
            }
            "two_factor_code"
        } else {
            let digest = digest_backup_code(code);
            if !self.users.consume_backup_digest(user.id, &digest).await? {
                return Err(self
                    .second_factor_failed(&user, AuthError::InvalidBackupCode)
                    .await?);
            }
            self.codes
                .invalidate(&user.email, VerificationPurpose::TwoFactor)
                .await;
            self.audit
                .record(Some(user.id), actions::BACKUP_CODE_USED, "")
                .await?;
            "backup_code"
        };

        let token = self.finish_login(&user, method).await?;
        Ok((user, token))
    }

    /// Count a rejected second factor toward lockout. A lock replaces `rejected`.
    async fn second_factor_failed(
        &self,
        user: &User,
        rejected: AuthError,
    ) -> Result<AuthError, AuthError> {
        let outcome = self
            .lockout
            .record_failure(user.email.as_str(), Utc::now())
            .await?;
        self.audit
            .record(Some(user.id), actions::LOGIN_FAILED, "second_factor")
            .await?;
        tracing::info!(
            user_id = %user.id,
            remaining_attempts = outcome.remaining_attempts,
            "Second factor rejected"
        );

        Ok(match outcome.status {
            LockoutStatus::Open => rejected,
            LockoutStatus::AccountLocked { until } => AuthError::AccountLocked { until },
            LockoutStatus::GlobalLocked { until } => AuthError::GlobalLocked { until },
        })
    }

    async fn finish_login(&self, user: &User, method: &str) -> Result<SessionToken, AuthError> {
        self.lockout.record_success(user.email.as_str()).await?;
        let token = self.sessions.start(user.id).await;
        self.audit
            .record(Some(user.id), actions::LOGIN, method)
            .await?;
        tracing::info!(user_id = %user.id, method, "User logged in");
        Ok(token)
    }

    /// End one session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the audit entry cannot be written.
    pub async fn logout(&self, user_id: UserId, token: SessionToken) -> Result<(), AuthError> {
        self.sessions.end(token).await;
        self.audit.record(Some(user_id), actions::LOGOUT, "").await?;
        Ok(())
    }

    // =========================================================================
    // Password Reset & Change
    // =========================================================================

    /// Email a password reset code if the account exists.
    ///
    /// Succeeds the same way whether or not the address is registered.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` for a malformed address.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await? else {
            tracing::debug!(email = %email.masked(), "Password reset for unknown email");
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        match self
            .codes
            .reissue(&user.email, VerificationPurpose::PasswordReset)
            .await
        {
            Ok(code) => self.send_code(&user, VerificationPurpose::PasswordReset, &code),
            Err(e) => tracing::debug!(user_id = %user.id, reason = %e, "Reset code not resent"),
        }
        Ok(())
    }

    /// Set a new password using an emailed reset code.
    ///
    /// Clears the account lockout and revokes every live session of the user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` or `AuthError::InvalidCode`.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        validate_password(new_password)?;

        self.codes
            .verify(&email, VerificationPurpose::PasswordReset, code)
            .await?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCode(VerificationError::NotFound))?;

        let hash = hash_password(new_password)?;
        self.users.update_password(user.id, &hash).await?;
        self.lockout.clear(email.as_str()).await?;
        let revoked = self.sessions.end_all_for_user(user.id).await;

        self.audit
            .record(
                Some(user.id),
                actions::PASSWORD_RESET,
                &format!("sessions_revoked={revoked}"),
            )
            .await?;
        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    /// Change the password of a signed-in user.
    ///
    /// Other sessions of the user are revoked; `keep` stays signed in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if `current` is wrong.
    pub async fn change_password(
        &self,
        user_id: UserId,
        keep: Option<SessionToken>,
        current: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.check_password(user_id, current).await?;
        validate_password(new_password)?;

        let hash = hash_password(new_password)?;
        self.users.update_password(user_id, &hash).await?;

        match keep {
            Some(token) => self.sessions.end_others_for_user(user_id, token).await,
            None => self.sessions.end_all_for_user(user_id).await,
        };

        self.audit
            .record(Some(user_id), actions::PASSWORD_CHANGED, "")
            .await?;
        Ok(())
    }

    // =========================================================================
    // Two-Factor Management
    // =========================================================================

    /// Turn on emailed-code 2FA. Returns the plain backup codes (shown once).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a wrong password and
    /// `AuthError::TwoFactorAlreadyEnabled` if it is already on.
    pub async fn enable_two_factor(
        &self,
        user_id: UserId,
        password: &str,
    ) -> Result<Vec<String>, AuthError> {
        let user = self.check_password(user_id, password).await?;
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let codes = generate_backup_codes();
        let digests: Vec<String> = codes.iter().map(|c| digest_backup_code(c)).collect();
        self.users.set_two_factor(user_id, true, &digests).await?;
        self.audit
            .record(Some(user_id), actions::TWO_FACTOR_ENABLED, "")
            .await?;
        Ok(codes)
    }

    /// Turn off 2FA and forget the backup codes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a wrong password and
    /// `AuthError::TwoFactorNotEnabled` if it is off.
    pub async fn disable_two_factor(&self, user_id: UserId, password: &str) -> Result<(), AuthError> {
        let user = self.check_password(user_id, password).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        self.users.set_two_factor(user_id, false, &[]).await?;
        self.codes
            .invalidate(&user.email, VerificationPurpose::TwoFactor)
            .await;
        self.audit
            .record(Some(user_id), actions::TWO_FACTOR_DISABLED, "")
            .await?;
        Ok(())
    }

    /// Replace all backup codes. Returns the new plain codes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a wrong password and
    /// `AuthError::TwoFactorNotEnabled` if 2FA is off.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: UserId,
        password: &str,
    ) -> Result<Vec<String>, AuthError> {
        let user = self.check_password(user_id, password).await?;
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let codes = generate_backup_codes();
        let digests: Vec<String> = codes.iter().map(|c| digest_backup_code(c)).collect();
        self.users.set_two_factor(user_id, true, &digests).await?;
        self.audit
            .record(Some(user_id), actions::BACKUP_CODES_REGENERATED, "")
            .await?;
        Ok(codes)
    }

    /// Number of unused backup codes.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the user cannot be read.
    pub async fn backup_codes_remaining(&self, user_id: UserId) -> Result<usize, AuthError> {
        Ok(self.users.get_backup_digests(user_id).await?.len())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn check_password(&self, user_id: UserId, password: &str) -> Result<User, AuthError> {
        let user = self.get_user(user_id).await?;
        let hash = self.users.get_password_hash(user_id).await?;
        verify_password(password, &hash)?;
        Ok(user)
    }

    /// Email a code. Delivery problems are logged, the flow carries on.
    fn send_code(&self, user: &User, purpose: VerificationPurpose, code: &str) {
        if let Err(e) = self.email.send_verification_code(
            &user.email,
            user.display_name(),
            purpose,
            code,
            self.codes.ttl_minutes(),
        ) {
            tracing::error!(user_id = %user.id, %purpose, error = %e, "Failed to send verification code");
        }
    }
}

/// Trim a display name; blank becomes `None`.
fn clean_name(name: Option<&str>) -> Result<Option<String>, AuthError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(Some(name.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{SessionConfig, VerificationConfig};
    use crate::db::create_memory_pool;
    use crate::services::lockout::LockoutPolicy;

    const PASSWORD: &str = "noodles4ever";

    struct Fixture {
        pool: SqlitePool,
        lockout: LockoutService,
        codes: VerificationCodes,
        email: EmailService,
        sessions: SessionRegistry,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = create_memory_pool().await.unwrap();
            Self {
                lockout: LockoutService::new(pool.clone(), LockoutPolicy::default()),
                pool,
                codes: VerificationCodes::new(VerificationConfig::default()),
                email: EmailService::outbox("http://localhost:3000"),
                sessions: SessionRegistry::new(SessionConfig::default()),
            }
        }

        fn auth(&self) -> AuthService<'_> {
            AuthService::new(
                &self.pool,
                &self.lockout,
                &self.codes,
                &self.email,
                &self.sessions,
            )
        }

        /// Six-digit code from the most recent email.
        fn last_code(&self) -> String {
            let sent = self.email.outbox_messages();
            let body = &sent.last().unwrap().text_body;
            body.split(|c: char| !c.is_ascii_digit())
                .find(|word| word.len() == 6)
                .unwrap()
                .to_owned()
        }

        async fn verified_user(&self, email: &str) -> User {
            let auth = self.auth();
            auth.register(email, PASSWORD, Some("Sam")).await.unwrap();
            auth.verify_email(email, &self.last_code()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_register_sends_code_and_verify_activates() {
        let fx = Fixture::new().await;
        let auth = fx.auth();

        let user = auth
            .register("Sam@Example.com", PASSWORD, Some("  Sam  "))
            .await
            .unwrap();
        assert!(!user.email_verified);
        assert_eq!(user.full_name.as_deref(), Some("Sam"));
        assert_eq!(fx.email.outbox_messages().len(), 1);

        let err = auth.login("sam@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailNotVerified));

        let user = auth
            .verify_email("sam@example.com", &fx.last_code())
            .await
            .unwrap();
        assert!(user.email_verified);

        let outcome = auth.login("sam@example.com", PASSWORD).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_weak_passwords() {
        let fx = Fixture::new().await;
        let auth = fx.auth();

        assert!(matches!(
            auth.register("a@example.com", "short", None).await,
            Err(AuthError::WeakPassword(_))
        ));
        auth.register("a@example.com", PASSWORD, None).await.unwrap();
        assert!(matches!(
            auth.register("A@example.com", PASSWORD, None).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_counts_down_then_locks() {
        let fx = Fixture::new().await;
        fx.verified_user("lock@example.com").await;
        let auth = fx.auth();

        for expected in (1..=4).rev() {
            let err = auth.login("lock@example.com", "wrong-pass1").await.unwrap_err();
            assert!(matches!(
                err,
                AuthError::InvalidCredentials { remaining_attempts: Some(n) } if n == expected
            ));
        }

        let err = auth.login("lock@example.com", "wrong-pass1").await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));

        // The right password does not get through while locked.
        let err = auth.login("lock@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));
    }

    #[tokio::test]
    async fn test_unknown_email_counts_toward_lockout() {
        let fx = Fixture::new().await;
        let auth = fx.auth();

        let err = auth.login("ghost@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidCredentials { remaining_attempts: Some(4) }
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let fx = Fixture::new().await;
        fx.verified_user("reset@example.com").await;
        let auth = fx.auth();

        auth.login("reset@example.com", "wrong-pass1").await.unwrap_err();
        auth.login("reset@example.com", PASSWORD).await.unwrap();

        let err = auth.login("reset@example.com", "wrong-pass1").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidCredentials { remaining_attempts: Some(4) }
        ));
    }

    #[tokio::test]
    async fn test_two_factor_with_email_code() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("2fa@example.com").await;
        let auth = fx.auth();

        let backup = auth.enable_two_factor(user.id, PASSWORD).await.unwrap();
        assert_eq!(backup.len(), 8);

        let LoginOutcome::TwoFactorRequired { user_id, .. } =
            auth.login("2fa@example.com", PASSWORD).await.unwrap()
        else {
            panic!("expected a second factor");
        };

        assert!(matches!(
            auth.complete_two_factor(user_id, "000000").await,
            Err(AuthError::InvalidCode(_))
        ));
        let (_, token) = auth
            .complete_two_factor(user_id, &fx.last_code())
            .await
            .unwrap();
        assert!(fx.sessions.status(token).await.is_some());
    }

    #[tokio::test]
    async fn test_backup_code_is_single_use() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("backup@example.com").await;
        let auth = fx.auth();
        let backup = auth.enable_two_factor(user.id, PASSWORD).await.unwrap();

        auth.login("backup@example.com", PASSWORD).await.unwrap();
        auth.complete_two_factor(user.id, &backup[0].to_lowercase())
            .await
            .unwrap();
        assert_eq!(auth.backup_codes_remaining(user.id).await.unwrap(), 7);

        auth.login("backup@example.com", PASSWORD).await.unwrap();
        assert!(matches!(
            auth.complete_two_factor(user.id, &backup[0]).await,
            Err(AuthError::InvalidBackupCode)
        ));
    }

    #[tokio::test]
    async fn test_wrong_second_factors_lock_the_account() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("guess@example.com").await;
        let auth = fx.auth();
        auth.enable_two_factor(user.id, PASSWORD).await.unwrap();

        let mut rejected = 0;
        let locked = loop {
            assert!(rejected < 10, "second factor guesses never locked the account");
            match auth.login("guess@example.com", PASSWORD).await {
                Ok(LoginOutcome::TwoFactorRequired { .. }) => {}
                Err(AuthError::AccountLocked { .. }) => break true,
                other => panic!("unexpected login result: {other:?}"),
            }
            match auth.complete_two_factor(user.id, "000000").await {
                Err(AuthError::InvalidCode(_)) => rejected += 1,
                Err(AuthError::AccountLocked { .. }) => break true,
                other => panic!("unexpected second factor result: {other:?}"),
            }
        };
        assert!(locked);

        // The real code does not get through either
        assert!(matches!(
            auth.complete_two_factor(user.id, "123456").await,
            Err(AuthError::AccountLocked { .. })
        ));
        assert!(matches!(
            auth.login("guess@example.com", PASSWORD).await,
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_backup_codes_count_toward_lockout() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("backup-guess@example.com").await;
        let auth = fx.auth();
        auth.enable_two_factor(user.id, PASSWORD).await.unwrap();
        auth.login("backup-guess@example.com", PASSWORD).await.unwrap();

        for _ in 0..4 {
            assert!(matches!(
                auth.complete_two_factor(user.id, "ZZZZ-ZZZZ").await,
                Err(AuthError::InvalidBackupCode)
            ));
        }
        assert!(matches!(
            auth.complete_two_factor(user.id, "ZZZZ-ZZZZ").await,
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_password_step_alone_keeps_failure_count() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("half@example.com").await;
        let auth = fx.auth();
        auth.enable_two_factor(user.id, PASSWORD).await.unwrap();

        auth.login("half@example.com", "wrong-pass1").await.unwrap_err();
        auth.login("half@example.com", PASSWORD).await.unwrap();
        let err = auth.login("half@example.com", "wrong-pass1").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidCredentials { remaining_attempts: Some(3) }
        ));

        // Finishing the second factor clears the count
        auth.complete_two_factor(user.id, &fx.last_code())
            .await
            .unwrap();
        let err = auth.login("half@example.com", "wrong-pass1").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidCredentials { remaining_attempts: Some(4) }
        ));
    }

    #[tokio::test]
    async fn test_two_factor_management_requires_password() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("manage@example.com").await;
        let auth = fx.auth();

        assert!(matches!(
            auth.enable_two_factor(user.id, "nope").await,
            Err(AuthError::InvalidCredentials { .. })
        ));
        assert!(matches!(
            auth.regenerate_backup_codes(user.id, PASSWORD).await,
            Err(AuthError::TwoFactorNotEnabled)
        ));

        let first = auth.enable_two_factor(user.id, PASSWORD).await.unwrap();
        assert!(matches!(
            auth.enable_two_factor(user.id, PASSWORD).await,
            Err(AuthError::TwoFactorAlreadyEnabled)
        ));
        let second = auth.regenerate_backup_codes(user.id, PASSWORD).await.unwrap();
        assert_ne!(first, second);

        auth.disable_two_factor(user.id, PASSWORD).await.unwrap();
        assert_eq!(auth.backup_codes_remaining(user.id).await.unwrap(), 0);
        assert!(matches!(
            auth.login("manage@example.com", PASSWORD).await.unwrap(),
            LoginOutcome::Authenticated { .. }
        ));
    }

    #[tokio::test]
    async fn test_password_reset_clears_lockout_and_sessions() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("forgot@example.com").await;
        let auth = fx.auth();

        let LoginOutcome::Authenticated { token, .. } =
            auth.login("forgot@example.com", PASSWORD).await.unwrap()
        else {
            panic!("expected a session");
        };
        for _ in 0..5 {
            auth.login("forgot@example.com", "wrong-pass1").await.unwrap_err();
        }

        auth.request_password_reset("forgot@example.com").await.unwrap();
        auth.reset_password("forgot@example.com", &fx.last_code(), "fresh-start9")
            .await
            .unwrap();

        assert!(fx.sessions.status(token).await.is_none());
        let outcome = auth.login("forgot@example.com", "fresh-start9").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated { user: u, .. } if u.id == user.id));
    }

    #[tokio::test]
    async fn test_password_reset_unknown_email_is_silent() {
        let fx = Fixture::new().await;
        fx.auth()
            .request_password_reset("nobody@example.com")
            .await
            .unwrap();
        assert!(fx.email.outbox_messages().is_empty());
    }

    #[tokio::test]
    async fn test_change_password_keeps_current_session() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("change@example.com").await;
        let auth = fx.auth();
        let current = fx.sessions.start(user.id).await;
        let other = fx.sessions.start(user.id).await;

        assert!(matches!(
            auth.change_password(user.id, Some(current), "wrong-pass1", "another-one2")
                .await,
            Err(AuthError::InvalidCredentials { .. })
        ));
        auth.change_password(user.id, Some(current), PASSWORD, "another-one2")
            .await
            .unwrap();

        assert!(fx.sessions.status(current).await.is_some());
        assert!(fx.sessions.status(other).await.is_none());
        assert!(auth.login("change@example.com", "another-one2").await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_account_cannot_login() {
        let fx = Fixture::new().await;
        let user = fx.verified_user("off@example.com").await;
        UserRepository::new(&fx.pool)
            .set_active(user.id, false)
            .await
            .unwrap();

        assert!(matches!(
            fx.auth().login("off@example.com", PASSWORD).await,
            Err(AuthError::AccountDisabled)
        ));
    }
}
