//! Idle-session watchdog endpoints.
//!
//! `GET /api/session` is excluded from activity tracking (see
//! [`crate::middleware::activity`]), so a client can poll it to drive a
//! "you will be signed out" countdown without keeping itself alive.

use axum::{Json, extract::State};
use serde::Serialize;

use crave_core::{UserId, UserRole};

use crate::error::AppError;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::services::session_monitor::SessionState;
use crate::state::AppState;

/// Session status as seen by the client.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionState>,
}

impl SessionStatus {
    const fn anonymous() -> Self {
        Self {
            authenticated: false,
            user_id: None,
            role: None,
            session: None,
        }
    }
}

/// GET /api/session
///
/// # Errors
///
/// Returns 500 if the session store fails.
pub async fn status(
    State(state): State<AppState>,
    OptionalAuth(current): OptionalAuth,
) -> Result<Json<SessionStatus>, AppError> {
    let Some(user) = current else {
        return Ok(Json(SessionStatus::anonymous()));
    };

    // The extractor just confirmed the token, but a sweep may land in between.
    let Some(session) = state.sessions().status(user.token).await else {
        return Ok(Json(SessionStatus::anonymous()));
    };

    Ok(Json(SessionStatus {
        authenticated: true,
        user_id: Some(user.id),
        role: Some(user.role),
        session: Some(session),
    }))
}

/// POST /api/session/heartbeat
///
/// The activity middleware has already pushed the deadline back; this reports
/// the refreshed state.
///
/// # Errors
///
/// Returns 401 if the session is gone.
pub async fn heartbeat(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SessionState>, AppError> {
    let session = state
        .sessions()
        .touch(user.token)
        .await
        .map_err(|_| AppError::Unauthorized("Session expired".to_string()))?;
    Ok(Json(session))
}
