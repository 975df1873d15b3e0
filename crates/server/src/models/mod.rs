//! Domain models for Crave.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`].

pub mod analytics;
pub mod audit;
pub mod cart;
pub mod food;
pub mod order;
pub mod session;
pub mod user;

pub use session::{CurrentUser, PendingTwoFactor, keys as session_keys};
pub use user::User;
