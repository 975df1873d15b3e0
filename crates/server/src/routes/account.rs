//! Account route handlers (profile, password, two-factor settings).

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::models::user::ProfileUpdate;
use crate::services::ProfileService;
use crate::state::AppState;

/// Profile edit. Omitted fields are left alone, an empty string clears one.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Re-authentication for sensitive 2FA changes.
#[derive(Debug, Deserialize)]
pub struct PasswordConfirmation {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    /// Shown once; only digests are kept.
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub backup_codes_remaining: usize,
}

/// GET /api/account/profile
///
/// # Errors
///
/// Returns 401 when signed out.
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<User>, AppError> {
    let profile = ProfileService::new(state.pool()).get_profile(user.id).await?;
    Ok(Json(profile))
}

/// PATCH /api/account/profile
///
/// # Errors
///
/// Returns 400 for over-long values or a malformed phone number.
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    let update = ProfileUpdate {
        full_name: req.full_name,
        phone: req.phone,
        address: req.address,
    };
    let profile = ProfileService::new(state.pool())
        .update_profile(user.id, update)
        .await?;
    Ok(Json(profile))
}

/// POST /api/account/password
///
/// Other sessions of the user are signed out; this one stays.
///
/// # Errors
///
/// Returns 401 for a wrong current password and 400 for a weak new one.
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    state
        .auth()
        .change_password(
            user.id,
            Some(user.token),
            &req.current_password,
            &req.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/account/2fa
///
/// # Errors
///
/// Returns 401 when signed out.
pub async fn two_factor_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<TwoFactorStatus>, AppError> {
    let auth = state.auth();
    let account = auth.get_user(user.id).await?;
    let backup_codes_remaining = auth.backup_codes_remaining(user.id).await?;
    Ok(Json(TwoFactorStatus {
        enabled: account.two_factor_enabled,
        backup_codes_remaining,
    }))
}

/// POST /api/account/2fa/enable
///
/// # Errors
///
/// Returns 401 for a wrong password and 409 if 2FA is already on.
pub async fn enable_two_factor(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<PasswordConfirmation>,
) -> Result<Json<BackupCodesResponse>, AppError> {
    let backup_codes = state
        .auth()
        .enable_two_factor(user.id, &req.password)
        .await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// POST /api/account/2fa/disable
///
/// # Errors
///
/// Returns 401 for a wrong password and 409 if 2FA is off.
pub async fn disable_two_factor(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<PasswordConfirmation>,
) -> Result<StatusCode, AppError> {
    state
        .auth()
        .disable_two_factor(user.id, &req.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/account/2fa/backup-codes
///
/// # Errors
///
/// Returns 401 for a wrong password and 409 if 2FA is off.
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<PasswordConfirmation>,
) -> Result<Json<BackupCodesResponse>, AppError> {
    let backup_codes = state
        .auth()
        .regenerate_backup_codes(user.id, &req.password)
        .await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}
