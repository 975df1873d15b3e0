//! Append-only audit trail.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crave_core::{AuditLogId, UserId};

use super::{RepositoryError, page_limit};
use crate::models::audit::AuditEntry;

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: AuditLogId,
    user_id: Option<UserId>,
    action: String,
    details: String,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

/// Repository for audit log entries.
pub struct AuditRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditRepository<'a> {
    /// Create a new audit repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(
        &self,
        user_id: Option<UserId>,
        action: &str,
        details: &str,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::record_in(&mut conn, user_id, action, details).await
    }

    /// Append an entry on an existing connection or transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record_in(
        conn: &mut SqliteConnection,
        user_id: Option<UserId>,
        action: &str,
        details: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO audit_log (user_id, action, details, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(action)
        .bind(details)
        .bind(Utc::now())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Most recent entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent(
        &self,
        user_id: Option<UserId>,
        limit: Option<u32>,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, user_id, action, details, created_at FROM audit_log \
             WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(page_limit(limit, 100, 1000))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
