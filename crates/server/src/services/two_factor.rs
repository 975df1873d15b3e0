//! Backup codes for email-based two-factor sign-in.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of backup codes handed out at a time.
pub const BACKUP_CODE_COUNT: usize = 8;

/// Uppercase letters and digits minus the easily confused `0 O 1 I L`.
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate a fresh set of `XXXX-XXXX` backup codes.
#[must_use]
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::rng();
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let mut code = String::with_capacity(9);
            for i in 0..8 {
                if i == 4 {
                    code.push('-');
                }
                let idx = rng.random_range(0..ALPHABET.len());
                code.push(char::from(ALPHABET[idx]));
            }
            code
        })
        .collect()
}

/// Canonical form used for hashing: no whitespace or dashes, uppercase.
#[must_use]
pub fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// SHA-256 hex digest of a backup code as stored in the database.
#[must_use]
pub fn digest_backup_code(code: &str) -> String {
    hex::encode(Sha256::digest(normalize_backup_code(code).as_bytes()))
}

/// Whether the input looks like an emailed 6-digit code rather than a backup code.
#[must_use]
pub fn is_email_code(code: &str) -> bool {
    let code = code.trim();
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}
