//! Persisted failed-login counters.
//!
//! One row per email with recent failures plus the [`GLOBAL_KEY`] sentinel row
//! that carries the site-wide lockout. The lockout service owns all the
//! read-modify-write logic; this module only moves rows in and out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use super::{RepositoryError, to_u32};

/// Key of the row that tracks failures across all accounts.
pub const GLOBAL_KEY: &str = "__global__";

/// Failure bookkeeping for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub key: String,
    pub failed_count: u32,
    pub first_failed_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    /// An empty record for `key`.
    #[must_use]
    pub fn fresh(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            failed_count: 0,
            first_failed_at: None,
            last_failed_at: None,
            locked_until: None,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    email: String,
    failed_count: i64,
    first_failed_at: Option<DateTime<Utc>>,
    last_failed_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for AttemptRecord {
    type Error = RepositoryError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Self {
            failed_count: to_u32(row.failed_count, "failed_count")?,
            key: row.email,
            first_failed_at: row.first_failed_at,
            last_failed_at: row.last_failed_at,
            locked_until: row.locked_until,
        })
    }
}

/// Repository for login attempt rows.
pub struct LoginAttemptRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LoginAttemptRepository<'a> {
    /// Create a new login attempt repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the record for a key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, key: &str) -> Result<Option<AttemptRecord>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, key).await
    }

    /// Delete the record for a key. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::remove(&mut conn, key).await
    }

    /// Records whose lock is still in force at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_locked(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AttemptRecord>, RepositoryError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            "SELECT email, failed_count, first_failed_at, last_failed_at, locked_until \
             FROM login_attempt WHERE locked_until IS NOT NULL AND locked_until > ? \
             ORDER BY locked_until DESC",
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(AttemptRecord::try_from).collect()
    }

    /// Fetch a record on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn fetch(
        conn: &mut SqliteConnection,
        key: &str,
    ) -> Result<Option<AttemptRecord>, RepositoryError> {
        let row: Option<AttemptRow> = sqlx::query_as(
            "SELECT email, failed_count, first_failed_at, last_failed_at, locked_until \
             FROM login_attempt WHERE email = ?",
        )
        .bind(key)
        .fetch_optional(conn)
        .await?;

        row.map(AttemptRecord::try_from).transpose()
    }

    /// Insert or overwrite a record on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn save(
        conn: &mut SqliteConnection,
        record: &AttemptRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO login_attempt (email, failed_count, first_failed_at, last_failed_at, locked_until) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (email) DO UPDATE SET \
                 failed_count = excluded.failed_count, \
                 first_failed_at = excluded.first_failed_at, \
                 last_failed_at = excluded.last_failed_at, \
                 locked_until = excluded.locked_until",
        )
        .bind(&record.key)
        .bind(i64::from(record.failed_count))
        .bind(record.first_failed_at)
        .bind(record.last_failed_at)
        .bind(record.locked_until)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Delete a record on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove(conn: &mut SqliteConnection, key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM login_attempt WHERE email = ?")
            .bind(key)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
