//! Short-lived emailed verification codes.
//!
//! Codes are kept in memory, keyed by `(email, purpose)`, and never survive a
//! restart. Only a SHA-256 digest of each code is held. A code is consumed by
//! the first successful [`VerificationCodes::verify`] and burned after too many
//! wrong guesses.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;

use crave_core::{Email, VerificationPurpose};

use crate::config::VerificationConfig;

/// Why a code was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("no verification code is pending")]
    NotFound,

    #[error("verification code has expired")]
    Expired,

    #[error("too many incorrect attempts, request a new code")]
    TooManyAttempts,

    #[error("incorrect verification code, {remaining} attempts remaining")]
    Mismatch { remaining: u32 },

    #[error("please wait {retry_after_secs} seconds before requesting another code")]
    ResendTooSoon { retry_after_secs: u64 },
}

#[derive(Debug, Clone)]
struct PendingCode {
    digest: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

/// Generate a 6-digit verification code.
#[must_use]
pub fn generate_verification_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

fn digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

/// In-memory store of pending codes. Clones share the same map.
#[derive(Clone)]
pub struct VerificationCodes {
    pending: Arc<Mutex<HashMap<(Email, VerificationPurpose), PendingCode>>>,
    ttl: Duration,
    max_attempts: u32,
    resend_cooldown: Duration,
}

impl VerificationCodes {
    #[must_use]
    pub fn new(config: VerificationConfig) -> Self {
        let to_chrono =
            |d: std::time::Duration| Duration::from_std(d).unwrap_or_else(|_| Duration::days(1));
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl: to_chrono(config.code_ttl),
            max_attempts: config.max_attempts,
            resend_cooldown: to_chrono(config.resend_cooldown),
        }
    }

    /// Code lifetime in whole minutes, for email wording.
    #[must_use]
    pub fn ttl_minutes(&self) -> i64 {
        self.ttl.num_minutes().max(1)
    }

    /// Issue a fresh code, replacing any outstanding one for the same key.
    pub async fn issue(&self, email: &Email, purpose: VerificationPurpose) -> String {
        self.issue_at(email, purpose, Utc::now()).await
    }

    /// [`Self::issue`] at an explicit instant.
    pub async fn issue_at(
        &self,
        email: &Email,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> String {
        let code = generate_verification_code();
        let entry = PendingCode {
            digest: digest(&code),
            issued_at: now,
            expires_at: now + self.ttl,
            attempts: 0,
        };
        self.pending
            .lock()
            .await
            .insert((email.clone(), purpose), entry);
        code
    }

    /// Issue a replacement code unless the previous one is younger than the resend cooldown.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::ResendTooSoon` inside the cooldown.
    pub async fn reissue(
        &self,
        email: &Email,
        purpose: VerificationPurpose,
    ) -> Result<String, VerificationError> {
        self.reissue_at(email, purpose, Utc::now()).await
    }

    /// [`Self::reissue`] at an explicit instant.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::ResendTooSoon` inside the cooldown.
    pub async fn reissue_at(
        &self,
        email: &Email,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<String, VerificationError> {
        let mut pending = self.pending.lock().await;
        let key = (email.clone(), purpose);

        if let Some(existing) = pending.get(&key) {
            let ready_at = existing.issued_at + self.resend_cooldown;
            if now < ready_at {
                let wait = (ready_at - now).num_seconds().max(1);
                return Err(VerificationError::ResendTooSoon {
                    retry_after_secs: u64::try_from(wait).unwrap_or(1),
                });
            }
        }

        let code = generate_verification_code();
        pending.insert(
            key,
            PendingCode {
                digest: digest(&code),
                issued_at: now,
                expires_at: now + self.ttl,
                attempts: 0,
            },
        );
        Ok(code)
    }

    /// Check a code. A correct code is consumed.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] describing why the code was rejected.
    pub async fn verify(
        &self,
        email: &Email,
        purpose: VerificationPurpose,
        code: &str,
    ) -> Result<(), VerificationError> {
        self.verify_at(email, purpose, code, Utc::now()).await
    }

    /// [`Self::verify`] at an explicit instant.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] describing why the code was rejected.
    pub async fn verify_at(
        &self,
        email: &Email,
        purpose: VerificationPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationError> {
        let mut pending = self.pending.lock().await;
        let key = (email.clone(), purpose);

        let Some(entry) = pending.get_mut(&key) else {
            return Err(VerificationError::NotFound);
        };

        if now > entry.expires_at {
            pending.remove(&key);
            return Err(VerificationError::Expired);
        }

        if entry.digest == digest(code) {
            pending.remove(&key);
            return Ok(());
        }

        entry.attempts += 1;
        if entry.attempts >= self.max_attempts {
            pending.remove(&key);
            return Err(VerificationError::TooManyAttempts);
        }
        Err(VerificationError::Mismatch {
            remaining: self.max_attempts - entry.attempts,
        })
    }

    /// Drop the outstanding code for a key, if any.
    pub async fn invalidate(&self, email: &Email, purpose: VerificationPurpose) {
        self.pending.lock().await.remove(&(email.clone(), purpose));
    }

    /// Drop every code that expired before `now`. Returns how many were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|_, entry| entry.expires_at >= now);
        before - pending.len()
    }

    /// Number of outstanding codes.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn codes() -> VerificationCodes {
        VerificationCodes::new(VerificationConfig {
            code_ttl: std::time::Duration::from_secs(600),
            max_attempts: 3,
            resend_cooldown: std::time::Duration::from_secs(30),
        })
    }

    fn email() -> Email {
        Email::parse("diner@example.com").unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 4, 18, 0, 0).unwrap()
    }

    fn wrong(code: &str) -> &'static str {
        if code == "111111" { "222222" } else { "111111" }
    }

    #[test]
    fn test_generate_verification_code_format() {
        for _ in 0..100 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..1_000_000).contains(&value));
        }
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let codes = codes();
        let code = codes
            .issue_at(&email(), VerificationPurpose::EmailVerification, t0())
            .await;

        codes
            .verify_at(&email(), VerificationPurpose::EmailVerification, &code, t0())
            .await
            .unwrap();
        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::EmailVerification, &code, t0())
                .await,
            Err(VerificationError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_purposes_are_independent() {
        let codes = codes();
        let code = codes
            .issue_at(&email(), VerificationPurpose::TwoFactor, t0())
            .await;
        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::PasswordReset, &code, t0())
                .await,
            Err(VerificationError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_expired_code_is_removed() {
        let codes = codes();
        let code = codes
            .issue_at(&email(), VerificationPurpose::PasswordReset, t0())
            .await;
        let late = t0() + Duration::seconds(601);

        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::PasswordReset, &code, late)
                .await,
            Err(VerificationError::Expired)
        );
        assert_eq!(codes.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_guesses_burn_code() {
        let codes = codes();
        let code = codes
            .issue_at(&email(), VerificationPurpose::TwoFactor, t0())
            .await;
        let bad = wrong(&code);

        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::TwoFactor, bad, t0())
                .await,
            Err(VerificationError::Mismatch { remaining: 2 })
        );
        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::TwoFactor, bad, t0())
                .await,
            Err(VerificationError::Mismatch { remaining: 1 })
        );
        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::TwoFactor, bad, t0())
                .await,
            Err(VerificationError::TooManyAttempts)
        );
        assert_eq!(
            codes
                .verify_at(&email(), VerificationPurpose::TwoFactor, &code, t0())
                .await,
            Err(VerificationError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_reissue_respects_cooldown() {
        let codes = codes();
        let first = codes
            .issue_at(&email(), VerificationPurpose::EmailVerification, t0())
            .await;

        let too_soon = codes
            .reissue_at(
                &email(),
                VerificationPurpose::EmailVerification,
                t0() + Duration::seconds(10),
            )
            .await;
        assert_eq!(
            too_soon,
            Err(VerificationError::ResendTooSoon {
                retry_after_secs: 20
            })
        );

        let second = codes
            .reissue_at(
                &email(),
                VerificationPurpose::EmailVerification,
                t0() + Duration::seconds(31),
            )
            .await
            .unwrap();

        if first != second {
            assert_eq!(
                codes
                    .verify_at(
                        &email(),
                        VerificationPurpose::EmailVerification,
                        &first,
                        t0() + Duration::seconds(32)
                    )
                    .await,
                Err(VerificationError::Mismatch { remaining: 2 })
            );
        }
        codes
            .verify_at(
                &email(),
                VerificationPurpose::EmailVerification,
                &second,
                t0() + Duration::seconds(33),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purge_and_invalidate() {
        let codes = codes();
        let other = Email::parse("other@example.com").unwrap();
        codes
            .issue_at(&email(), VerificationPurpose::TwoFactor, t0())
            .await;
        codes
            .issue_at(&other, VerificationPurpose::TwoFactor, t0() + Duration::minutes(9))
            .await;

        assert_eq!(codes.purge_expired(t0() + Duration::minutes(11)).await, 1);
        assert_eq!(codes.pending_count().await, 1);

        codes.invalidate(&other, VerificationPurpose::TwoFactor).await;
        assert_eq!(codes.pending_count().await, 0);
    }
}
