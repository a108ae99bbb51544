//! Client name validation

/// Maximum length for client names in characters
pub const MAX_CLIENT_NAME_LENGTH: usize = 50;

/// Validation error for client names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientNameError {
    #[error("client name is empty")]
    Empty,
    #[error("client name exceeds {MAX_CLIENT_NAME_LENGTH} characters")]
    TooLong,
    #[error("client name may only contain letters, digits, '_' and '-'")]
    InvalidCharacters,
}

/// Validate a client name
///
/// Checks:
/// - Not empty
/// - Does not exceed maximum length (50 characters)
/// - Contains only ASCII letters, digits, `_` and `-`
///
/// # Errors
///
/// Returns a `ClientNameError` variant describing the validation failure.
pub fn validate_client_name(name: &str) -> Result<(), ClientNameError> {
    if name.is_empty() {
        return Err(ClientNameError::Empty);
    }
    if name.len() > MAX_CLIENT_NAME_LENGTH {
        return Err(ClientNameError::TooLong);
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ClientNameError::InvalidCharacters);
    }
    Ok(())
}
