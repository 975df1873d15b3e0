//! Self-service profile edits.

use sqlx::SqlitePool;

use crave_core::UserId;

use super::error::{ServiceError, clean_text};
use crate::db::{AuditRepository, UserRepository};
use crate::models::audit::actions;
use crate::models::user::{ProfileUpdate, User};

const MAX_NAME_LENGTH: usize = 100;
const MAX_PHONE_LENGTH: usize = 30;
const MAX_ADDRESS_LENGTH: usize = 500;

/// Profile service.
pub struct ProfileService<'a> {
    users: UserRepository<'a>,
    audit: AuditRepository<'a>,
}

impl<'a> ProfileService<'a> {
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self {
            users: UserRepository::new(pool),
            audit: AuditRepository::new(pool),
        }
    }

    /// The signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the account is gone.
    pub async fn get_profile(&self, user_id: UserId) -> Result<User, ServiceError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    /// Update name, phone and address.
    ///
    /// Values are trimmed. `None` leaves a field alone; a blank value clears it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for over-long values or a malformed phone number.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<User, ServiceError> {
        let update = ProfileUpdate {
            full_name: clean_field("full name", update.full_name, MAX_NAME_LENGTH)?,
            phone: clean_field("phone", update.phone, MAX_PHONE_LENGTH)?,
            address: clean_field("address", update.address, MAX_ADDRESS_LENGTH)?,
        };
        if let Some(phone) = update.phone.as_deref()
            && !is_phone_number(phone)
        {
            return Err(ServiceError::Validation(
                "phone may only contain digits, spaces and + - ( )".to_owned(),
            ));
        }

        let changed: Vec<&str> = [
            ("full_name", update.full_name.is_some()),
            ("phone", update.phone.is_some()),
            ("address", update.address.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();

        let user = self
            .users
            .update_profile(user_id, &update)
            .await
            .map_err(ServiceError::not_found("user"))?;

        self.audit
            .record(
                Some(user_id),
                actions::PROFILE_UPDATED,
                &format!("fields={}", changed.join(",")),
            )
            .await?;
        Ok(user)
    }
}

/// `None` stays `None`; blank input becomes `Some("")` so the column is cleared.
fn clean_field(
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ServiceError> {
    match value {
        None => Ok(None),
        Some(value) => Ok(Some(
            clean_text(field, &value, max, false)?.unwrap_or_default(),
        )),
    }
}

fn is_phone_number(phone: &str) -> bool {
    phone.is_empty()
        || (phone.chars().any(|c| c.is_ascii_digit())
            && phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')')))
}
