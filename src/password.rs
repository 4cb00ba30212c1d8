//! Argon2id password hashing (PHC string format).

use anyhow::{Result, anyhow};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;

// Stand-in hash verified for unknown accounts so both login paths cost one Argon2 run.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("not-a-real-account").ok());

/// Hash a password with a fresh random salt.
///
/// # Errors
/// Returns an error if Argon2 rejects the input.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| anyhow!("failed to hash password"))?
        .to_string();
    Ok(hash)
}

/// Check a password against a stored PHC hash. Unparseable hashes never match.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Like [`verify_password`], but an absent account still pays for a full
/// verification against a fixed hash and then fails.
#[must_use]
pub fn verify_password_or_dummy(password: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            false
        }
    }
}
