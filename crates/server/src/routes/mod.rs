//! HTTP route handlers for the ordering API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Readiness (pings the database)
//!
//! # Auth
//! POST /api/auth/register              - Create an unverified customer account
//! POST /api/auth/verify-email          - Confirm the emailed code
//! POST /api/auth/resend-verification   - Send a fresh verification code
//! POST /api/auth/login                 - Password login (may ask for a 2FA code)
//! POST /api/auth/2fa                   - Finish a login with a 2FA or backup code
//! POST /api/auth/logout                - End the session
//! POST /api/auth/password-reset/request
//! POST /api/auth/password-reset/confirm
//!
//! # Session watchdog
//! GET  /api/session                    - Idle time left (does not count as activity)
//! POST /api/session/heartbeat          - Keep the session alive
//!
//! # Catalog
//! GET  /api/foods                      - Available menu items (?category=&search=)
//! GET  /api/foods/{id}                 - One menu item
//! GET  /api/categories                 - Distinct categories
//!
//! # Cart (requires auth)
//! GET    /api/cart                     - Cart with totals
//! POST   /api/cart                     - Add an item
//! DELETE /api/cart                     - Empty the cart
//! PATCH  /api/cart/{food_id}           - Set a line's quantity (0 removes)
//! DELETE /api/cart/{food_id}           - Remove a line
//!
//! # Orders (requires auth)
//! POST /api/orders/checkout            - Turn the cart into an order
//! GET  /api/orders                     - Order history
//! GET  /api/orders/{id}                - Order with items
//! POST /api/orders/{id}/cancel         - Cancel a pending order
//!
//! # Account (requires auth)
//! GET/PATCH /api/account/profile
//! POST /api/account/password
//! GET  /api/account/2fa                - 2FA state and unused backup codes
//! POST /api/account/2fa/enable | /2fa/disable | /2fa/backup-codes
//!
//! # Back office (requires admin)
//! /api/admin/users, /api/admin/lockouts, /api/admin/foods, /api/admin/orders,
//! /api/admin/audit, /api/admin/sessions, /api/admin/analytics/*
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod health;
pub mod orders;
pub mod session;

use axum::{
    Router,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::{SessionManagerLayer, SessionStore};

use crate::middleware::session_activity_middleware;
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/login", post(auth::login))
        .route("/2fa", post(auth::two_factor))
        .route("/logout", post(auth::logout))
        .route("/password-reset/request", post(auth::request_password_reset))
        .route("/password-reset/confirm", post(auth::confirm_password_reset))
}

/// Create the session watchdog routes router.
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(session::status))
        .route("/heartbeat", post(session::heartbeat))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add).delete(cart::clear))
        .route(
            "/{food_id}",
            patch(cart::update).delete(cart::remove),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/checkout", post(orders::checkout))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(account::profile).patch(account::update_profile),
        )
        .route("/password", post(account::change_password))
        .route("/2fa", get(account::two_factor_status))
        .route("/2fa/enable", post(account::enable_two_factor))
        .route("/2fa/disable", post(account::disable_two_factor))
        .route("/2fa/backup-codes", post(account::regenerate_backup_codes))
}

/// Create the back-office routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // Users
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            get(admin::show_user)
                .patch(admin::update_user)
                .delete(admin::delete_user),
        )
        // Lockouts
        .route("/lockouts", get(admin::locked_accounts))
        .route("/lockouts/clear", post(admin::clear_lockout))
        .route("/lockouts/global", delete(admin::clear_global_lockout))
        // Menu
        .route("/foods", get(admin::list_foods).post(admin::create_food))
        .route(
            "/foods/{id}",
            get(admin::show_food)
                .put(admin::update_food)
                .delete(admin::delete_food),
        )
        .route("/foods/{id}/availability", post(admin::set_food_availability))
        // Orders
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}", get(admin::show_order))
        .route("/orders/{id}/status", post(admin::update_order_status))
        // Audit & sessions
        .route("/audit", get(admin::audit_log))
        .route("/sessions", get(admin::active_sessions))
        // Analytics
        .route("/analytics/summary", get(admin::sales_summary))
        .route("/analytics/top-items", get(admin::top_items))
        .route("/analytics/daily", get(admin::daily_sales))
        .route("/analytics/status", get(admin::status_breakdown))
}

/// Create all routes for the ordering API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth_routes())
        .nest("/api/session", session_routes())
        .route("/api/foods", get(catalog::index))
        .route("/api/foods/{id}", get(catalog::show))
        .route("/api/categories", get(catalog::categories))
        .nest("/api/cart", cart_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/account", account_routes())
        .nest("/api/admin", admin_routes())
}

/// Build the complete application: routes, session handling, activity
/// tracking, tracing and Sentry.
///
/// # Middleware Order (outermost first)
///
/// 1. Sentry (hub per request, HTTP transaction)
/// 2. `TraceLayer`
/// 3. `Cache-Control: no-store` on every response
/// 4. Session layer
/// 5. Session activity (touches the idle-session watchdog)
pub fn app<S: SessionStore + Clone>(state: AppState, session_layer: SessionManagerLayer<S>) -> Router {
    Router::new()
        .merge(routes())
        .layer(from_fn_with_state(state.clone(), session_activity_middleware))
        .layer(session_layer)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
