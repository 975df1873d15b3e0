//! Authentication route handlers.
//!
//! Login is a two-step affair for accounts with 2FA: the password step parks
//! a [`PendingTwoFactor`] in the cookie session and `/2fa` completes it.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::error::AppError;
use crate::middleware::{
    OptionalAuth, clear_current_user, pending_two_factor, set_current_user, set_pending_two_factor,
};
use crate::models::{CurrentUser, PendingTwoFactor, User, session_keys};
use crate::services::{AuthError, LoginOutcome};
use crate::state::AppState;

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// Outcome of a login step.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    /// Signed in.
    Authenticated { user: User },
    /// A code was sent to `email` (masked); post it to `/api/auth/2fa`.
    TwoFactorRequired { email: String },
}

// =============================================================================
// Registration
// =============================================================================

/// POST /api/auth/register
///
/// # Errors
///
/// Returns 400 for a malformed email or weak password and 409 for a taken email.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth()
        .register(&req.email, &req.password, req.full_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/verify-email
///
/// # Errors
///
/// Returns 400 for a wrong or expired code.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<EmailCodeRequest>,
) -> Result<Json<User>, AppError> {
    let user = state.auth().verify_email(&req.email, &req.code).await?;
    Ok(Json(user))
}

/// POST /api/auth/resend-verification
///
/// # Errors
///
/// Returns 429 while the resend cooldown is running.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<StatusCode, AppError> {
    state.auth().resend_verification(&req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

// =============================================================================
// Login / Logout
// =============================================================================

/// POST /api/auth/login
///
/// # Errors
///
/// Returns 401 with `remaining_attempts` for bad credentials, 423 while the
/// account (or the whole site) is locked and 403 for disabled or unverified
/// accounts.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state.auth().login(&req.email, &req.password).await?;

    // A successful password step replaces whatever login this cookie carried.
    if let Some(previous) = session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?
    {
        state.sessions().end(previous.token).await;
    }

    match outcome {
        LoginOutcome::Authenticated { user, token } => {
            let current = CurrentUser {
                id: user.id,
                email: user.email.clone(),
                role: user.role,
                token,
            };
            set_current_user(&session, &current).await?;
            Ok(Json(LoginResponse::Authenticated { user }))
        }
        LoginOutcome::TwoFactorRequired { user_id, email } => {
            let masked = email.masked();
            set_pending_two_factor(&session, &PendingTwoFactor { user_id, email }).await?;
            Ok(Json(LoginResponse::TwoFactorRequired { email: masked }))
        }
    }
}

/// POST /api/auth/2fa
///
/// # Errors
///
/// Returns 401 when no login is waiting and 400 when the code is rejected.
pub async fn two_factor(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CodeRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let pending = pending_two_factor(&session)
        .await?
        .ok_or(AuthError::NoPendingTwoFactor)?;

    let (user, token) = state
        .auth()
        .complete_two_factor(pending.user_id, &req.code)
        .await?;

    let current = CurrentUser {
        id: user.id,
        email: user.email.clone(),
        role: user.role,
        token,
    };
    set_current_user(&session, &current).await?;
    Ok(Json(LoginResponse::Authenticated { user }))
}

/// POST /api/auth/logout
///
/// Succeeds whether or not anyone was signed in.
///
/// # Errors
///
/// Returns 500 if the session store fails.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(current): OptionalAuth,
) -> Result<StatusCode, AppError> {
    if let Some(user) = current {
        state.auth().logout(user.id, user.token).await?;
    }
    clear_current_user(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Password reset
// =============================================================================

/// POST /api/auth/password-reset/request
///
/// Always 202, whether or not the address has an account.
///
/// # Errors
///
/// Returns 400 for a malformed email.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<StatusCode, AppError> {
    state.auth().request_password_reset(&req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/auth/password-reset/confirm
///
/// # Errors
///
/// Returns 400 for a wrong code or weak password.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    state
        .auth()
        .reset_password(&req.email, &req.code, &req.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
