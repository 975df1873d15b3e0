//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::services::{
    AdminUserService, AuthService, EmailService, LockoutPolicy, LockoutService, SessionRegistry,
    VerificationCodes,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the database pool and the in-memory auth stores.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    pool: SqlitePool,
    lockout: LockoutService,
    codes: VerificationCodes,
    email: EmailService,
    sessions: SessionRegistry,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The session registry and verification code store start empty; the
    /// lockout policy comes from `config.lockout`.
    #[must_use]
    pub fn new(config: AppConfig, pool: SqlitePool, email: EmailService) -> Self {
        let lockout = LockoutService::new(pool.clone(), LockoutPolicy::from(config.lockout));
        let codes = VerificationCodes::new(config.verification);
        let sessions = SessionRegistry::new(config.session);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                lockout,
                codes,
                email,
                sessions,
            }),
        }
    }

    /// Get a reference to the application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutService {
        &self.inner.lockout
    }

    #[must_use]
    pub fn codes(&self) -> &VerificationCodes {
        &self.inner.codes
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    /// Get a reference to the idle-session registry.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Authentication service bound to this state.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            &self.inner.pool,
            &self.inner.lockout,
            &self.inner.codes,
            &self.inner.email,
            &self.inner.sessions,
        )
    }

    /// Admin user service bound to this state.
    #[must_use]
    pub fn admin_users(&self) -> AdminUserService<'_> {
        AdminUserService::new(&self.inner.pool, &self.inner.lockout, &self.inner.sessions)
    }
}
