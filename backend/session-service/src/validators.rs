use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AuthError, Result};

// Input validation for credentials

/// Upper bound on accepted passwords; Argon2 cost grows with input length
pub const MAX_PASSWORD_LENGTH: usize = 128;

// Hardcoded pattern, always valid
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Canonical form used for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate a new password and its confirmation.
///
/// Both must be present and identical, and the length (in characters) must lie
/// within `[min_length, MAX_PASSWORD_LENGTH]`. No composition rules.
pub fn validate_new_password(password: &str, confirmation: &str, min_length: usize) -> Result<()> {
    if password.is_empty() {
        return Err(AuthError::Validation("password is required".to_string()));
    }
    if confirmation.is_empty() {
        return Err(AuthError::Validation(
            "password confirmation is required".to_string(),
        ));
    }
    if password != confirmation {
        return Err(AuthError::Validation(
            "password confirmation does not match".to_string(),
        ));
    }

    let length = password.chars().count();
    if length < min_length {
        return Err(AuthError::Validation(format!(
            "password must be at least {min_length} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}
