//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration, login, 2FA, password reset (plus password hashing)
//! - `lockout` - Per-account and global brute-force lockout
//! - `verification` - Emailed one-time codes
//! - `two_factor` - Backup code generation and hashing
//! - `session_monitor` - Idle-session registry and watchdog task
//! - `email` - Transactional email rendering and dispatch
//! - `catalog`, `cart`, `orders` - Customer ordering flows and menu management
//! - `admin_users` - Back-office account management
//! - `analytics` - Sales aggregates over completed orders
//! - `profile` - Self-service profile edits

pub mod admin_users;
pub mod analytics;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod email;
mod error;
pub mod lockout;
pub mod orders;
pub mod profile;
pub mod session_monitor;
pub mod two_factor;
pub mod verification;

pub use admin_users::AdminUserService;
pub use analytics::AnalyticsService;
pub use auth::{AuthError, AuthService, LoginOutcome};
pub use cart::CartService;
pub use catalog::{CatalogService, ImportSummary};
pub use email::{EmailService, MailError, OutboxMessage};
pub use error::ServiceError;
pub use lockout::{LockoutError, LockoutPolicy, LockoutService, LockoutStatus};
pub use orders::OrderService;
pub use profile::ProfileService;
pub use session_monitor::{
    SessionEvent, SessionMonitor, SessionRegistry, SessionToken, audit_session_events,
};
pub use verification::{VerificationCodes, VerificationError};
