//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Responses are JSON: `{"error": "<message>"}` plus a few machine-readable
//! fields where the client needs them (`remaining_attempts`, `locked_until`,
//! `retry_after_secs`).

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::verification::VerificationError;
use crate::services::{LockoutError, ServiceError};

/// Application-level error type for the ordering API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Catalog, cart, order, admin or profile operation failed.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LockoutError> for AppError {
    fn from(err: LockoutError) -> Self {
        Self::Service(ServiceError::Lockout(err))
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session store: {err}"))
    }
}

impl AppError {
    /// Whether this is our fault rather than the client's.
    fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) => true,
            Self::Auth(err) => auth_is_server_error(err),
            Self::Service(err) => matches!(
                err,
                ServiceError::Repository(_) | ServiceError::Lockout(_)
            ) || matches!(err, ServiceError::Auth(inner) if auth_is_server_error(inner)),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(err) => auth_status(err),
            Self::Service(err) => match err {
                ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::ItemUnavailable(_)
                | ServiceError::EmptyCart
                | ServiceError::InvalidTransition { .. }
                | ServiceError::Conflict(_) => StatusCode::CONFLICT,
                ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
                ServiceError::Auth(inner) => auth_status(inner),
                ServiceError::Lockout(_) | ServiceError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-facing message. Internal details never leave the server.
    fn message(&self) -> String {
        if self.is_server_error() {
            return "Internal server error".to_string();
        }
        match self {
            Self::Auth(err) => auth_message(err),
            Self::Service(ServiceError::Auth(err)) => auth_message(err),
            Self::Service(err) => err.to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Database(_) => "Internal server error".to_string(),
        }
    }

    /// Extra JSON fields for errors the client can act on.
    fn details(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        if let Self::Auth(err) = self {
            match err {
                AuthError::InvalidCredentials {
                    remaining_attempts: Some(n),
                } => {
                    extra.insert("remaining_attempts".into(), json!(n));
                }
                AuthError::AccountLocked { until } | AuthError::GlobalLocked { until } => {
                    extra.insert("locked_until".into(), json!(until));
                }
                AuthError::InvalidCode(VerificationError::ResendTooSoon { retry_after_secs }) => {
                    extra.insert("retry_after_secs".into(), json!(retry_after_secs));
                }
                AuthError::InvalidCode(VerificationError::Mismatch { remaining }) => {
                    extra.insert("remaining_attempts".into(), json!(remaining));
                }
                _ => {}
            }
        }
        extra
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Auth(AuthError::InvalidCode(VerificationError::ResendTooSoon {
                retry_after_secs,
            })) => Some(*retry_after_secs),
            Self::Auth(AuthError::AccountLocked { until } | AuthError::GlobalLocked { until }) => {
                let secs = (*until - chrono::Utc::now()).num_seconds().max(1);
                u64::try_from(secs).ok()
            }
            _ => None,
        }
    }
}

const fn auth_is_server_error(err: &AuthError) -> bool {
    matches!(
        err,
        AuthError::Repository(_) | AuthError::Lockout(_) | AuthError::PasswordHash
    )
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials { .. } | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
        AuthError::AccountLocked { .. } | AuthError::GlobalLocked { .. } => StatusCode::LOCKED,
        AuthError::AccountDisabled | AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
        AuthError::UserAlreadyExists
        | AuthError::TwoFactorAlreadyEnabled
        | AuthError::TwoFactorNotEnabled => StatusCode::CONFLICT,
        AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        AuthError::InvalidCode(VerificationError::ResendTooSoon { .. }) => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AuthError::InvalidCode(_) | AuthError::InvalidBackupCode => StatusCode::BAD_REQUEST,
        AuthError::NoPendingTwoFactor => StatusCode::UNAUTHORIZED,
        AuthError::Lockout(_) | AuthError::Repository(_) | AuthError::PasswordHash => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn auth_message(err: &AuthError) -> String {
    match err {
        AuthError::InvalidCredentials {
            remaining_attempts: Some(n),
        } => format!("Invalid email or password. {n} attempt(s) remaining before lockout"),
        AuthError::InvalidCredentials { .. } | AuthError::UserNotFound => {
            "Invalid email or password".to_string()
        }
        AuthError::AccountLocked { until } => format!(
            "Too many failed attempts. Try again after {}",
            until.format("%H:%M UTC")
        ),
        AuthError::GlobalLocked { .. } => {
            "Sign-in is temporarily unavailable. Please try again in a few minutes".to_string()
        }
        AuthError::AccountDisabled => "This account has been disabled".to_string(),
        AuthError::EmailNotVerified => {
            "Please verify your email address. We sent you a code".to_string()
        }
        AuthError::UserAlreadyExists => "An account with this email already exists".to_string(),
        AuthError::WeakPassword(msg) | AuthError::InvalidInput(msg) => msg.clone(),
        AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
        AuthError::InvalidCode(err) => match err {
            VerificationError::NotFound => "No code is pending. Request a new one".to_string(),
            VerificationError::Expired => "The code has expired. Request a new one".to_string(),
            VerificationError::TooManyAttempts => {
                "Too many wrong codes. Request a new one".to_string()
            }
            VerificationError::Mismatch { .. } => "Incorrect code".to_string(),
            VerificationError::ResendTooSoon { retry_after_secs } => {
                format!("Please wait {retry_after_secs}s before requesting another code")
            }
        },
        AuthError::InvalidBackupCode => "Invalid backup code".to_string(),
        AuthError::NoPendingTwoFactor => "Sign in with your password first".to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let mut body = self.details();
        body.insert("error".into(), Value::String(self.message()));

        let mut response = (status, Json(Value::Object(body))).into_response();
        if let Some(secs) = self.retry_after()
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use crave_core::OrderStatus;

    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_status_codes() {
        fn status(err: impl Into<AppError>) -> StatusCode {
            err.into().into_response().status()
        }

        assert_eq!(status(AppError::NotFound("order".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AppError::Unauthorized("login".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status(AuthError::EmailNotVerified), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            status(AuthError::AccountLocked {
                until: Utc::now() + Duration::minutes(5)
            }),
            StatusCode::LOCKED
        );
        assert_eq!(status(ServiceError::EmptyCart), StatusCode::CONFLICT);
        assert_eq!(
            status(ServiceError::InvalidTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Cancelled,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ServiceError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(AuthError::InvalidCode(VerificationError::ResendTooSoon {
                retry_after_secs: 12
            })),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_invalid_credentials_body() {
        let response = AppError::from(AuthError::InvalidCredentials {
            remaining_attempts: Some(2),
        })
        .into_response();
        let body = body_json(response).await;
        assert_eq!(body["remaining_attempts"], 2);
        assert!(body["error"].as_str().unwrap().contains("2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let response =
            AppError::Database(RepositoryError::DataCorruption("secret".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[test]
    fn test_resend_sets_retry_after() {
        let response = AppError::from(AuthError::InvalidCode(VerificationError::ResendTooSoon {
            retry_after_secs: 17,
        }))
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "17");
    }
}
