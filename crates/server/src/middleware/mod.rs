//! HTTP middleware stack for the ordering API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. `Cache-Control: no-store` on every response
//! 4. Session layer (tower-sessions)
//! 5. Session activity (touches the idle-session watchdog)

pub mod activity;
pub mod auth;
pub mod session;

pub use activity::session_activity_middleware;
pub use auth::{
    OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, pending_two_factor,
    set_current_user, set_pending_two_factor,
};
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
