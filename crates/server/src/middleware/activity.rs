//! Activity interception for the idle-session watchdog.
//!
//! Every request from a signed-in user counts as activity and pushes the idle
//! deadline back. Polling the session status does not, otherwise a client
//! showing a countdown would keep itself alive forever.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;

use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Response header carrying the idle seconds left after this request.
pub const SESSION_REMAINING_HEADER: &str = "x-session-remaining";

/// Path that reports session state without counting as activity.
const STATUS_PATH: &str = "/api/session";

/// Touch the caller's watchdog entry; sign out sessions that already idled out.
pub async fn session_activity_middleware(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let is_status_poll = request.method() == Method::GET && request.uri().path() == STATUS_PATH;

    let user = if is_status_poll {
        None
    } else {
        session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
    };

    let mut remaining = None;
    if let Some(user) = user {
        match state.sessions().touch(user.token).await {
            Ok(status) => remaining = Some(status.remaining.as_secs()),
            Err(_) => {
                tracing::info!(user_id = %user.id, "Request on expired session");
                if let Err(e) = session.flush().await {
                    tracing::error!(error = %e, "Failed to flush expired session");
                }
            }
        }
    }

    let mut response = next.run(request).await;
    if let Some(secs) = remaining
        && let Ok(value) = HeaderValue::from_str(&secs.to_string())
    {
        response
            .headers_mut()
            .insert(SESSION_REMAINING_HEADER, value);
    }
    response
}
