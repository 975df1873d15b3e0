//! CLI subcommand implementations.

pub mod lockout;
pub mod migrate;
pub mod seed;
pub mod user;

use crave_server::config::{AppConfig, ConfigError};
use crave_server::db;
use sqlx::SqlitePool;

/// Load configuration from the environment and open the database.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the database cannot be opened.
pub async fn connect() -> Result<(AppConfig, SqlitePool), ConnectError> {
    let config = AppConfig::from_env()?;
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    Ok((config, pool))
}

/// Errors that can occur while opening the database.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}
