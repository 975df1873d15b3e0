//! User repository for database operations.
//!
//! Password hashes and backup-code digests are only handed out by the
//! dedicated credential accessors; everything else returns [`User`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crave_core::{Email, UserId, UserRole};

use super::{RepositoryError, page_limit};
use crate::models::user::{NewUser, ProfileUpdate, User};

macro_rules! select_user {
    ($tail:literal) => {
        concat!(
            "SELECT id, email, password_hash, role, full_name, phone, address, ",
            "email_verified, two_factor_enabled, backup_codes, is_active, created_at, updated_at ",
            "FROM user ",
            $tail
        )
    };
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: Email,
    password_hash: String,
    role: UserRole,
    full_name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    email_verified: bool,
    two_factor_enabled: bool,
    backup_codes: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn backup_digests(&self) -> Result<Vec<String>, RepositoryError> {
        serde_json::from_str(&self.backup_codes)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid backup codes: {e}")))
    }

    fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            role: self.role,
            full_name: self.full_name,
            phone: self.phone,
            address: self.address,
            email_verified: self.email_verified,
            two_factor_enabled: self.two_factor_enabled,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(select_user!("WHERE email = ?"))
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(select_user!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    /// Get a user together with their password hash, by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(select_user!("WHERE email = ?"))
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|r| {
            let hash = r.password_hash.clone();
            (r.into_user(), hash)
        }))
    }

    /// Get a user's password hash by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn get_password_hash(&self, id: UserId) -> Result<String, RepositoryError> {
        sqlx::query_scalar("SELECT password_hash FROM user WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let now = Utc::now();
        let row: UserRow = sqlx::query_as(concat!(
            "INSERT INTO user (email, password_hash, role, full_name, email_verified, created_at, updated_at) ",
            "VALUES (?, ?, ?, ?, ?, ?, ?) ",
            "RETURNING id, email, password_hash, role, full_name, phone, address, ",
            "email_verified, two_factor_enabled, backup_codes, is_active, created_at, updated_at"
        ))
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role)
        .bind(&new_user.full_name)
        .bind(new_user.email_verified)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "email"))?;

        Ok(row.into_user())
    }

    /// Mark a user's email address as verified.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn mark_email_verified(&self, id: UserId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE user SET email_verified = TRUE, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(self.pool)
                .await?;
        expect_one(result.rows_affected())
    }

    /// Replace a user's password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE user SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?;
        expect_one(result.rows_affected())
    }

    /// Turn two-factor authentication on or off, replacing the backup-code digests.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_two_factor(
        &self,
        id: UserId,
        enabled: bool,
        backup_digests: &[String],
    ) -> Result<(), RepositoryError> {
        let encoded = encode_digests(backup_digests)?;
        let result = sqlx::query(
            "UPDATE user SET two_factor_enabled = ?, backup_codes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(enabled)
        .bind(encoded)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool)
        .await?;
        expect_one(result.rows_affected())
    }

    /// Get the stored backup-code digests for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::DataCorruption` if the stored JSON is invalid.
    pub async fn get_backup_digests(&self, id: UserId) -> Result<Vec<String>, RepositoryError> {
        let row: UserRow = sqlx::query_as(select_user!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        row.backup_digests()
    }

    /// Remove one backup-code digest if it is still present.
    ///
    /// Returns `false` when the digest was not stored (already used or never issued).
    /// The read and write run in one transaction so a code can only be spent once.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn consume_backup_digest(
        &self,
        id: UserId,
        digest: &str,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: UserRow = sqlx::query_as(select_user!("WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut digests = row.backup_digests()?;
        let Some(pos) = digests.iter().position(|d| d == digest) else {
            return Ok(false);
        };
        digests.remove(pos);

        sqlx::query("UPDATE user SET backup_codes = ?, updated_at = ? WHERE id = ?")
            .bind(encode_digests(&digests)?)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Update profile fields. `None` keeps the stored value, an empty string clears it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(concat!(
            "UPDATE user SET ",
            "full_name = CASE WHEN ?1 IS NULL THEN full_name ELSE NULLIF(?1, '') END, ",
            "phone = CASE WHEN ?2 IS NULL THEN phone ELSE NULLIF(?2, '') END, ",
            "address = CASE WHEN ?3 IS NULL THEN address ELSE NULLIF(?3, '') END, ",
            "updated_at = ?4 ",
            "WHERE id = ?5 ",
            "RETURNING id, email, password_hash, role, full_name, phone, address, ",
            "email_verified, two_factor_enabled, backup_codes, is_active, created_at, updated_at"
        ))
        .bind(&update.full_name)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(UserRow::into_user).ok_or(RepositoryError::NotFound)
    }

    /// List users, newest first, optionally filtered by an email or name substring.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        search: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<User>, RepositoryError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));

        let rows: Vec<UserRow> = sqlx::query_as(select_user!(
            "WHERE (?1 IS NULL OR email LIKE ?1 OR full_name LIKE ?1) ORDER BY id DESC LIMIT ?2"
        ))
        .bind(pattern)
        .bind(page_limit(limit, 50, 500))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_role(&self, id: UserId, role: UserRole) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE user SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?;
        expect_one(result.rows_affected())
    }

    /// Enable or disable an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_active(&self, id: UserId, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE user SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?;
        expect_one(result.rows_affected())
    }

    /// Delete a user. Carts and orders cascade; audit entries keep a NULL user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM user WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        expect_one(result.rows_affected())
    }
}

fn encode_digests(digests: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(digests)
        .map_err(|e| RepositoryError::DataCorruption(format!("failed to encode backup codes: {e}")))
}

const fn expect_one(rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}
