//! Authentication extractors.
//!
//! The cookie session holds a [`CurrentUser`]; it is only honoured while its
//! [`SessionToken`](crate::services::SessionToken) is still live in the
//! watchdog registry. A token that idled out or was revoked (password reset,
//! account deactivated) clears the cookie session and the request is rejected.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CurrentUser, PendingTwoFactor, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let user = live_user(session, state)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Please sign in".to_string()))?;
        Ok(Self(user))
    }
}

/// Extractor that requires a signed-in administrator.
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin hit admin route");
            return Err(AppError::Forbidden("Administrator access required".to_string()));
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is signed in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => live_user(session, state).await?,
            None => None,
        };
        Ok(Self(user))
    }
}

/// The session's user if their watchdog entry is still live.
async fn live_user(session: &Session, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let Some(user) = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await?
    else {
        return Ok(None);
    };

    if state.sessions().status(user.token).await.is_some() {
        return Ok(Some(user));
    }

    tracing::info!(user_id = %user.id, token = %user.token, "Session no longer live, signing out");
    session.flush().await?;
    Ok(None)
}

/// Helper to set the current user in the session.
///
/// Cycles the session ID first so a pre-login cookie cannot be fixated.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.remove::<PendingTwoFactor>(session_keys::PENDING_TWO_FACTOR).await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

/// Remember a login that is waiting for its second factor.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_pending_two_factor(
    session: &Session,
    pending: &PendingTwoFactor,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::PENDING_TWO_FACTOR, pending)
        .await
}

/// The login waiting for its second factor, if any.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
pub async fn pending_two_factor(
    session: &Session,
) -> Result<Option<PendingTwoFactor>, tower_sessions::session::Error> {
    session.get(session_keys::PENDING_TWO_FACTOR).await
}
