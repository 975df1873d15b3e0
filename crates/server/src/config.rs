//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Database / HTTP
//! - `CRAVE_DATABASE_URL` - SQLite URL (fallback `DATABASE_URL`, default `sqlite://crave.db`)
//! - `CRAVE_HOST` - Bind address (default: 127.0.0.1)
//! - `CRAVE_PORT` - Listen port (default: 3000)
//! - `CRAVE_BASE_URL` - Public URL (default: `http://localhost:3000`)
//!
//! ## Sessions
//! - `SESSION_IDLE_TIMEOUT_SECS` - Idle time before forced logout (default: 900)
//! - `SESSION_WARNING_SECS` - Remaining time at which a warning is emitted (default: 60)
//! - `SESSION_CHECK_INTERVAL_SECS` - Watchdog sweep interval (default: 5)
//!
//! ## Lockout
//! - `LOCKOUT_MAX_ATTEMPTS` - Failed logins before an account locks (default: 5)
//! - `LOCKOUT_DURATION_SECS` - Account lock length (default: 900)
//! - `GLOBAL_LOCKOUT_MAX_ATTEMPTS` - Failed logins across all accounts per window (default: 20)
//! - `GLOBAL_LOCKOUT_WINDOW_SECS` - Global counting window (default: 300)
//! - `GLOBAL_LOCKOUT_DURATION_SECS` - Global lock length (default: 300)
//!
//! ## Verification codes
//! - `VERIFICATION_CODE_TTL_SECS` - Code lifetime (default: 600)
//! - `VERIFICATION_MAX_ATTEMPTS` - Wrong guesses before a code is burned (default: 5)
//! - `VERIFICATION_RESEND_COOLDOWN_SECS` - Minimum gap between resends (default: 30)
//!
//! ## Email (optional; without `SMTP_HOST` mail goes to an in-memory outbox)
//! - `SMTP_HOST`, `SMTP_PORT` (default 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//!
//! ## Error tracking
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://crave.db";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database URL
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Idle-session watchdog settings
    pub session: SessionConfig,
    /// Brute-force lockout thresholds
    pub lockout: LockoutConfig,
    /// Emailed verification code settings
    pub verification: VerificationConfig,
    /// SMTP settings (None means the in-memory outbox is used)
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Idle-session watchdog settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// A session idle for longer than this is force-logged-out.
    pub idle_timeout: Duration,
    /// A warning fires once remaining idle time drops below this.
    pub warning_threshold: Duration,
    /// How often the watchdog sweeps all sessions.
    pub check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15 * 60),
            warning_threshold: Duration::from_secs(60),
            check_interval: Duration::from_secs(5),
        }
    }
}

/// Per-account and global lockout thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutConfig {
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    pub global_max_failed_attempts: u32,
    pub global_window: Duration,
    pub global_lockout_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::from_secs(15 * 60),
            global_max_failed_attempts: 20,
            global_window: Duration::from_secs(5 * 60),
            global_lockout_duration: Duration::from_secs(5 * 60),
        }
    }
}

/// Verification code lifetime and guessing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationConfig {
    pub code_ttl: Duration,
    pub max_attempts: u32,
    pub resend_cooldown: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(10 * 60),
            max_attempts: 5,
            resend_cooldown: Duration::from_secs(30),
        }
    }
}

/// SMTP delivery settings.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed, if SMTP is partially
    /// configured, or if the timing values contradict each other.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("CRAVE_DATABASE_URL");
        let host = get_parsed_or_default("CRAVE_HOST", "127.0.0.1".parse::<IpAddr>().ok())?;
        let port = get_parsed_or_default("CRAVE_PORT", Some(3000_u16))?;
        let base_url = get_env_or_default("CRAVE_BASE_URL", "http://localhost:3000");

        let session = SessionConfig::from_env()?;
        let lockout = LockoutConfig::from_env()?;
        let verification = VerificationConfig::from_env()?;
        let email = EmailConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session,
            lockout,
            verification,
            email,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_or_default("SENTRY_SAMPLE_RATE", Some(1.0))?,
            sentry_traces_sample_rate: get_parsed_or_default(
                "SENTRY_TRACES_SAMPLE_RATE",
                Some(0.1),
            )?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Built-in defaults with the given database and no SMTP or Sentry.
    #[must_use]
    pub fn with_defaults(database_url: SecretString) -> Self {
        Self {
            database_url,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            session: SessionConfig::default(),
            lockout: LockoutConfig::default(),
            verification: VerificationConfig::default(),
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl SessionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            idle_timeout: get_secs_or_default("SESSION_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            warning_threshold: get_secs_or_default(
                "SESSION_WARNING_SECS",
                defaults.warning_threshold,
            )?,
            check_interval: get_secs_or_default(
                "SESSION_CHECK_INTERVAL_SECS",
                defaults.check_interval,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the watchdog timings are usable together.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Inconsistent` for a zero timeout or interval, or a
    /// warning threshold that is not shorter than the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout.is_zero() || self.check_interval.is_zero() {
            return Err(ConfigError::Inconsistent(
                "session timeout and check interval must be positive".to_string(),
            ));
        }
        if self.warning_threshold >= self.idle_timeout {
            return Err(ConfigError::Inconsistent(format!(
                "session warning ({}s) must be shorter than the idle timeout ({}s)",
                self.warning_threshold.as_secs(),
                self.idle_timeout.as_secs()
            )));
        }
        Ok(())
    }
}

impl LockoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_failed_attempts: get_parsed_or_default(
                "LOCKOUT_MAX_ATTEMPTS",
                Some(defaults.max_failed_attempts),
            )?,
            lockout_duration: get_secs_or_default(
                "LOCKOUT_DURATION_SECS",
                defaults.lockout_duration,
            )?,
            global_max_failed_attempts: get_parsed_or_default(
                "GLOBAL_LOCKOUT_MAX_ATTEMPTS",
                Some(defaults.global_max_failed_attempts),
            )?,
            global_window: get_secs_or_default("GLOBAL_LOCKOUT_WINDOW_SECS", defaults.global_window)?,
            global_lockout_duration: get_secs_or_default(
                "GLOBAL_LOCKOUT_DURATION_SECS",
                defaults.global_lockout_duration,
            )?,
        };
        if config.max_failed_attempts == 0 || config.global_max_failed_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "lockout attempt limits must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

impl VerificationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            code_ttl: get_secs_or_default("VERIFICATION_CODE_TTL_SECS", defaults.code_ttl)?,
            max_attempts: get_parsed_or_default(
                "VERIFICATION_MAX_ATTEMPTS",
                Some(defaults.max_attempts),
            )?,
            resend_cooldown: get_secs_or_default(
                "VERIFICATION_RESEND_COOLDOWN_SECS",
                defaults.resend_cooldown,
            )?,
        };
        if config.code_ttl.is_zero() || config.max_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "verification code TTL and attempt limit must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

impl EmailConfig {
    /// SMTP is enabled by `SMTP_HOST`; once it is set the rest is required.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: get_parsed_or_default("SMTP_PORT", Some(587_u16))?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("SMTP_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get the database URL, falling back to `DATABASE_URL` and then a local file.
fn get_database_url(primary_key: &str) -> SecretString {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_or_else(
            |_| SecretString::from(DEFAULT_DATABASE_URL),
            SecretString::from,
        )
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using `default` when it is unset.
fn get_parsed_or_default<T>(key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => default.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Parse a whole number of seconds into a `Duration`.
fn get_secs_or_default(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match get_optional_env(key) {
        Some(raw) => parse_value::<u64>(key, &raw).map(Duration::from_secs),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
