/// Password hashing and verification using Argon2id
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use once_cell::sync::Lazy;

use crate::error::{AuthError, Result};

/// Hash verified when the account does not exist, so both failure paths cost
/// one Argon2 verification.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("timing-equalizer-not-a-real-password").ok());

/// Hash a password using Argon2id
/// Returns the PHC string suitable for storage in database
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(rand::thread_rng());
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::Internal("Failed to hash password".to_string()))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored hash.
///
/// `Ok(false)` on mismatch; `Err` only if the stored hash is unparseable.
/// Argon2 compares digests in constant time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AuthError::Internal("Invalid password hash format".to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Verify against `stored` if present, otherwise against a dummy hash.
/// Always `false` when `stored` is `None`.
pub fn verify_password_timing_safe(password: &str, stored: Option<&str>) -> Result<bool> {
    match stored {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            Ok(false)
        }
    }
}
