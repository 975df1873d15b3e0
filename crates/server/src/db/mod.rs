//! Database operations for the Crave SQLite store.
//!
//! ## Tables
//!
//! - `user` - Accounts, credential hashes, 2FA flag and backup-code digests
//! - `food_item` - Menu catalog
//! - `cart_item` - User to food association with quantity
//! - `customer_order` / `order_item` - Cart snapshots taken at checkout
//! - `audit_log` - Append-only action trail
//! - `login_attempt` - Failed-login counters and the global lockout sentinel
//! - `tower_sessions` - Cookie session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations live in `crates/server/migrations/` and are embedded in
//! [`MIGRATOR`]. Run them via:
//! ```bash
//! crave migrate
//! ```

pub mod audit_log;
pub mod cart;
pub mod foods;
pub mod login_attempts;
pub mod orders;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;

pub use audit_log::AuditRepository;
pub use cart::CartRepository;
pub use foods::FoodRepository;
pub use login_attempts::{AttemptRecord, LoginAttemptRepository};
pub use orders::OrderRepository;
pub use users::UserRepository;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a SQLite connection pool with sensible defaults.
///
/// The database file is created if missing and foreign keys are enforced on
/// every connection (cascade deletes depend on it).
///
/// # Errors
///
/// Returns `sqlx::Error` if the URL is invalid or the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url.expose_secret())?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
}

/// Create a migrated in-memory database.
///
/// A single connection is kept alive forever; each SQLite in-memory
/// connection is its own database.
///
/// # Errors
///
/// Returns an error if the connection or the migrations fail.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
    Ok(pool)
}

/// Clamp a caller-supplied page size into `1..=max`.
pub(crate) fn page_limit(limit: Option<u32>, default: u32, max: u32) -> i64 {
    i64::from(limit.unwrap_or(default).clamp(1, max))
}

/// Convert a stored non-negative count into `u32`.
pub(crate) fn to_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("{column} out of range: {value}")))
}

/// Convert stored cents into a `Price`.
pub(crate) fn to_price(cents: i64, column: &str) -> Result<crave_core::Price, RepositoryError> {
    crave_core::Price::from_cents(cents)
        .map_err(|e| RepositoryError::DataCorruption(format!("{column}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pool_is_migrated() {
        let pool = create_memory_pool().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '_sqlx%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "audit_log",
            "cart_item",
            "customer_order",
            "food_item",
            "login_attempt",
            "order_item",
            "user",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = create_memory_pool().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO cart_item (user_id, food_item_id, quantity, added_at) VALUES (999, 999, 1, '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_page_limit_clamps() {
        assert_eq!(page_limit(None, 50, 200), 50);
        assert_eq!(page_limit(Some(0), 50, 200), 1);
        assert_eq!(page_limit(Some(1000), 50, 200), 200);
    }
}
