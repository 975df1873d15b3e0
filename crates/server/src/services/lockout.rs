//! Brute-force login lockout.
//!
//! Two counters are kept in `login_attempt`: one row per email and the
//! [`GLOBAL_KEY`] sentinel row that counts failures across every account.
//!
//! - An account locks for `lockout_duration` after `max_failed_attempts`
//!   consecutive failures. A successful login deletes its row.
//! - The site locks for `global_lockout_duration` once
//!   `global_max_failed_attempts` failures land inside one `global_window`.
//!   The window starts at the first failure and restarts once it has elapsed.
//!
//! An expired lock reads as open. The next failure after it starts a fresh count.
//!
//! [`LockoutPolicy`] holds the pure transitions; [`LockoutService`] runs them
//! against the database under one mutex and one transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::LockoutConfig;
use crate::db::login_attempts::GLOBAL_KEY;
use crate::db::{AttemptRecord, LoginAttemptRepository, RepositoryError};

/// Errors from lockout bookkeeping.
#[derive(Debug, Error)]
pub enum LockoutError {
    #[error("lockout storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("lockout transaction error: {0}")]
    Transaction(#[from] sqlx::Error),
}

/// Whether a login may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockoutStatus {
    Open,
    AccountLocked { until: DateTime<Utc> },
    GlobalLocked { until: DateTime<Utc> },
}

impl LockoutStatus {
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Result of recording one failed login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecorded {
    /// Lock state after this failure.
    pub status: LockoutStatus,
    /// Failures left before the account locks (zero once locked).
    pub remaining_attempts: u32,
}

/// Lockout thresholds and the pure state transitions over [`AttemptRecord`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    pub global_max_failed_attempts: u32,
    pub global_window: Duration,
    pub global_lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from(LockoutConfig::default())
    }
}

impl From<LockoutConfig> for LockoutPolicy {
    fn from(config: LockoutConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lockout_duration: to_chrono(config.lockout_duration),
            global_max_failed_attempts: config.global_max_failed_attempts,
            global_window: to_chrono(config.global_window),
            global_lockout_duration: to_chrono(config.global_lockout_duration),
        }
    }
}

fn to_chrono(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::weeks(52 * 100))
}

/// `Some(until)` if the record carries a lock still in force at `now`.
fn active_lock(record: Option<&AttemptRecord>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    record
        .and_then(|r| r.locked_until)
        .filter(|until| *until > now)
}

impl LockoutPolicy {
    /// Lock state given the stored account and global records. Global wins.
    #[must_use]
    pub fn status(
        &self,
        account: Option<&AttemptRecord>,
        global: Option<&AttemptRecord>,
        now: DateTime<Utc>,
    ) -> LockoutStatus {
        if let Some(until) = active_lock(global, now) {
            return LockoutStatus::GlobalLocked { until };
        }
        if let Some(until) = active_lock(account, now) {
            return LockoutStatus::AccountLocked { until };
        }
        LockoutStatus::Open
    }

    /// Apply one failure to an account record.
    #[must_use]
    pub fn account_failure(
        &self,
        key: &str,
        record: Option<AttemptRecord>,
        now: DateTime<Utc>,
    ) -> AttemptRecord {
        let mut record = match record {
            Some(r) if r.locked_until.is_some_and(|until| until <= now) => {
                AttemptRecord::fresh(key)
            }
            Some(r) => r,
            None => AttemptRecord::fresh(key),
        };

        if active_lock(Some(&record), now).is_some() {
            record.last_failed_at = Some(now);
            return record;
        }

        record.failed_count = record.failed_count.saturating_add(1);
        record.first_failed_at.get_or_insert(now);
        record.last_failed_at = Some(now);
        if record.failed_count >= self.max_failed_attempts {
            record.locked_until = Some(now + self.lockout_duration);
        }
        record
    }

    /// Apply one failure to the global sentinel record.
    #[must_use]
    pub fn global_failure(&self, record: Option<AttemptRecord>, now: DateTime<Utc>) -> AttemptRecord {
        let mut record = record.unwrap_or_else(|| AttemptRecord::fresh(GLOBAL_KEY));

        if active_lock(Some(&record), now).is_some() {
            record.last_failed_at = Some(now);
            return record;
        }

        let window_open = record
            .first_failed_at
            .is_some_and(|first| now - first <= self.global_window);
        let lock_expired = record.locked_until.is_some();

        if window_open && !lock_expired {
            record.failed_count = record.failed_count.saturating_add(1);
        } else {
            record.failed_count = 1;
            record.first_failed_at = Some(now);
            record.locked_until = None;
        }
        record.last_failed_at = Some(now);

        if record.failed_count >= self.global_max_failed_attempts {
            record.locked_until = Some(now + self.global_lockout_duration);
        }
        record
    }

    /// Failures left before the account locks.
    #[must_use]
    pub const fn remaining_attempts(&self, record: &AttemptRecord) -> u32 {
        self.max_failed_attempts.saturating_sub(record.failed_count)
    }
}

/// Database-backed lockout bookkeeping.
///
/// Cloning shares the mutex, so every clone serializes against the others.
#[derive(Clone)]
pub struct LockoutService {
    pool: SqlitePool,
    policy: LockoutPolicy,
    guard: Arc<Mutex<()>>,
}

impl LockoutService {
    #[must_use]
    pub fn new(pool: SqlitePool, policy: LockoutPolicy) -> Self {
        Self {
            pool,
            policy,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Current lock state for `key`. Never writes.
    ///
    /// # Errors
    ///
    /// Returns `LockoutError` if the records cannot be read.
    pub async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<LockoutStatus, LockoutError> {
        let _guard = self.guard.lock().await;
        let mut conn = self.pool.acquire().await?;
        let global = LoginAttemptRepository::fetch(&mut conn, GLOBAL_KEY).await?;
        let account = LoginAttemptRepository::fetch(&mut conn, key).await?;
        Ok(self.policy.status(account.as_ref(), global.as_ref(), now))
    }

    /// Count a failed login against `key` and the global counter.
    ///
    /// # Errors
    ///
    /// Returns `LockoutError` if the records cannot be updated.
    pub async fn record_failure(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureRecorded, LockoutError> {
        let _guard = self.guard.lock().await;
        let mut tx = self.pool.begin().await?;

        let account = LoginAttemptRepository::fetch(&mut tx, key).await?;
        let account = self.policy.account_failure(key, account, now);
        LoginAttemptRepository::save(&mut tx, &account).await?;

        let global = LoginAttemptRepository::fetch(&mut tx, GLOBAL_KEY).await?;
        let global = self.policy.global_failure(global, now);
        LoginAttemptRepository::save(&mut tx, &global).await?;

        tx.commit().await?;

        let status = self.policy.status(Some(&account), Some(&global), now);
        if let LockoutStatus::AccountLocked { until } = status
            && account.failed_count == self.policy.max_failed_attempts
        {
            tracing::warn!(failed_count = account.failed_count, %until, "Account locked");
        }
        if let LockoutStatus::GlobalLocked { until } = status
            && global.failed_count == self.policy.global_max_failed_attempts
        {
            tracing::warn!(failed_count = global.failed_count, %until, "Global login lockout engaged");
        }

        Ok(FailureRecorded {
            status,
            remaining_attempts: self.policy.remaining_attempts(&account),
        })
    }

    /// Forget the failures of `key` after a successful login. The global row is untouched.
    ///
    /// # Errors
    ///
    /// Returns `LockoutError` if the row cannot be deleted.
    pub async fn record_success(&self, key: &str) -> Result<(), LockoutError> {
        self.clear(key).await.map(|_| ())
    }

    /// Lift the account lock of `key`. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns `LockoutError` if the row cannot be deleted.
    pub async fn clear(&self, key: &str) -> Result<bool, LockoutError> {
        let _guard = self.guard.lock().await;
        let mut conn = self.pool.acquire().await?;
        Ok(LoginAttemptRepository::remove(&mut conn, key).await?)
    }

    /// Lift the global lock. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `LockoutError` if the row cannot be deleted.
    pub async fn clear_global(&self) -> Result<bool, LockoutError> {
        self.clear(GLOBAL_KEY).await
    }

    /// Records whose lock is in force at `now`, the global row included.
    ///
    /// # Errors
    ///
    /// Returns `LockoutError` if the rows cannot be read.
    pub async fn locked(&self, now: DateTime<Utc>) -> Result<Vec<AttemptRecord>, LockoutError> {
        Ok(LoginAttemptRepository::new(&self.pool)
            .list_locked(now)
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::create_memory_pool;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn policy() -> LockoutPolicy {
        LockoutPolicy {
            max_failed_attempts: 3,
            lockout_duration: Duration::minutes(15),
            global_max_failed_attempts: 5,
            global_window: Duration::minutes(5),
            global_lockout_duration: Duration::minutes(5),
        }
    }

    #[test]
    fn test_account_locks_at_threshold() {
        let policy = policy();
        let mut record = None;
        for i in 1..=3 {
            let next = policy.account_failure("a@x.io", record, t0());
            assert_eq!(next.failed_count, i);
            record = Some(next);
        }
        let record = record.unwrap();
        assert_eq!(record.locked_until, Some(t0() + Duration::minutes(15)));
        assert_eq!(policy.remaining_attempts(&record), 0);
        assert!(matches!(
            policy.status(Some(&record), None, t0()),
            LockoutStatus::AccountLocked { .. }
        ));
    }

    #[test]
    fn test_expired_lock_reads_open_and_restarts_count() {
        let policy = policy();
        let mut record = AttemptRecord::fresh("a@x.io");
        record.failed_count = 3;
        record.locked_until = Some(t0());

        let later = t0() + Duration::seconds(1);
        assert_eq!(policy.status(Some(&record), None, later), LockoutStatus::Open);

        let next = policy.account_failure("a@x.io", Some(record), later);
        assert_eq!(next.failed_count, 1);
        assert_eq!(next.locked_until, None);
        assert_eq!(policy.remaining_attempts(&next), 2);
    }

    #[test]
    fn test_global_window_restarts() {
        let policy = policy();
        let first = policy.global_failure(None, t0());
        assert_eq!(first.failed_count, 1);

        let inside = policy.global_failure(Some(first.clone()), t0() + Duration::minutes(4));
        assert_eq!(inside.failed_count, 2);

        let outside = policy.global_failure(Some(inside), t0() + Duration::minutes(6));
        assert_eq!(outside.failed_count, 1);
        assert_eq!(outside.first_failed_at, Some(t0() + Duration::minutes(6)));
    }

    #[test]
    fn test_global_lock_takes_precedence() {
        let policy = policy();
        let mut global = None;
        for _ in 0..5 {
            global = Some(policy.global_failure(global, t0()));
        }
        let global = global.unwrap();
        let account = policy.account_failure("b@x.io", None, t0());

        assert_eq!(
            policy.status(Some(&account), Some(&global), t0()),
            LockoutStatus::GlobalLocked {
                until: t0() + Duration::minutes(5)
            }
        );
        assert_eq!(
            policy.status(Some(&account), Some(&global), t0() + Duration::minutes(5)),
            LockoutStatus::Open
        );
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let pool = create_memory_pool().await.unwrap();
        let service = LockoutService::new(pool, policy());

        let first = service.record_failure("c@x.io", t0()).await.unwrap();
        assert_eq!(first.status, LockoutStatus::Open);
        assert_eq!(first.remaining_attempts, 2);

        service.record_failure("c@x.io", t0()).await.unwrap();
        let third = service.record_failure("c@x.io", t0()).await.unwrap();
        assert!(matches!(third.status, LockoutStatus::AccountLocked { .. }));
        assert!(service.check("c@x.io", t0()).await.unwrap().is_locked());
        assert_eq!(
            service.check("other@x.io", t0()).await.unwrap(),
            LockoutStatus::Open
        );

        assert!(service.clear("c@x.io").await.unwrap());
        assert_eq!(
            service.check("c@x.io", t0()).await.unwrap(),
            LockoutStatus::Open
        );
    }

    #[tokio::test]
    async fn test_service_global_lock_and_clear() {
        let pool = create_memory_pool().await.unwrap();
        let service = LockoutService::new(pool, policy());

        for i in 0..5 {
            service
                .record_failure(&format!("user{i}@x.io"), t0())
                .await
                .unwrap();
        }
        assert!(matches!(
            service.check("fresh@x.io", t0()).await.unwrap(),
            LockoutStatus::GlobalLocked { .. }
        ));
        assert!(!service.locked(t0()).await.unwrap().is_empty());

        assert!(service.clear_global().await.unwrap());
        assert_eq!(
            service.check("fresh@x.io", t0()).await.unwrap(),
            LockoutStatus::Open
        );
    }

    #[tokio::test]
    async fn test_success_resets_account_only() {
        let pool = create_memory_pool().await.unwrap();
        let service = LockoutService::new(pool.clone(), policy());

        service.record_failure("d@x.io", t0()).await.unwrap();
        service.record_success("d@x.io").await.unwrap();

        let repo = LoginAttemptRepository::new(&pool);
        assert!(repo.get("d@x.io").await.unwrap().is_none());
        assert_eq!(repo.get(GLOBAL_KEY).await.unwrap().unwrap().failed_count, 1);
    }
}
