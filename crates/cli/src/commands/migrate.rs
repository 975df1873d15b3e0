//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! crave migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CRAVE_DATABASE_URL` - SQLite URL (fallback `DATABASE_URL`, default `sqlite://crave.db`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/server/migrations/` and are embedded into the
//! server library, so this binary always applies the schema it was built with.

use crave_server::db::MIGRATOR;

use super::{ConnectError, connect};

/// Errors that can occur while migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let (_, pool) = connect().await?;

    tracing::info!("Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
