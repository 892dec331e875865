//! Password validation.
//!
//! Applied when credentials are created or changed, never on unlock: an
//! existing vault must stay openable even if the policy tightens later.

use crate::error::{Result, VellumError};

/// Minimum password length in characters.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate a password for use as an encryption password.
///
/// Rejects empty or all-whitespace input and anything shorter than 8
/// characters. Length is counted in characters, not bytes, so multibyte
/// passwords are not penalized.
///
/// # Errors
///
/// Returns `VellumError::InvalidInput` describing the first failed rule.
pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(VellumError::InvalidInput(
            "Password cannot be empty".to_string(),
        ));
    }

    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(VellumError::InvalidInput(format!(
            "Password must be at least {} characters (got {})",
            MIN_PASSWORD_LENGTH, length
        )));
    }

    Ok(())
}
