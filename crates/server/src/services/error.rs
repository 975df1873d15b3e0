//! Error type shared by the catalog, cart, order, admin and profile services.

use thiserror::Error;

use crave_core::OrderStatus;

use crate::db::RepositoryError;

/// Errors from the non-auth services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// The entity does not exist (or is not visible to the caller).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A menu item cannot be ordered right now.
    #[error("{0} is currently unavailable")]
    ItemUnavailable(String),

    /// Checkout with nothing in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// The order lifecycle does not allow this move.
    #[error("order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The caller may not perform this action.
    #[error("{0}")]
    Forbidden(String),

    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    /// Password rules or hashing, shared with the auth service.
    #[error(transparent)]
    Auth(#[from] crate::services::AuthError),

    /// Lockout bookkeeping failed.
    #[error("lockout error: {0}")]
    Lockout(#[from] crate::services::LockoutError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

impl ServiceError {
    /// Map `RepositoryError::NotFound` to `ServiceError::NotFound(what)`.
    pub(crate) fn not_found(what: &'static str) -> impl FnOnce(RepositoryError) -> Self {
        move |err| match err {
            RepositoryError::NotFound => Self::NotFound(what),
            other => Self::from(other),
        }
    }
}

/// Trim `value` and check its length. Empty input is rejected when `required`.
pub(crate) fn clean_text(
    field: &str,
    value: &str,
    max: usize,
    required: bool,
) -> Result<Option<String>, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        if required {
            return Err(ServiceError::Validation(format!("{field} is required")));
        }
        return Ok(None);
    }
    if value.chars().count() > max {
        return Err(ServiceError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(value.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(
            clean_text("name", "  Pad Thai ", 20, true).unwrap().as_deref(),
            Some("Pad Thai")
        );
        assert_eq!(clean_text("notes", "   ", 20, false).unwrap(), None);
        assert!(matches!(
            clean_text("name", " ", 20, true),
            Err(ServiceError::Validation(msg)) if msg == "name is required"
        ));
        assert!(clean_text("name", "abcdef", 5, true).is_err());
    }

    #[test]
    fn test_not_found_mapping() {
        let err = ServiceError::not_found("order")(RepositoryError::NotFound);
        assert!(matches!(err, ServiceError::NotFound("order")));

        let err = ServiceError::not_found("order")(RepositoryError::Conflict("dup".into()));
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}
