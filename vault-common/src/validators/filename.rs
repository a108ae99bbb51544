//! Backup filename validation
//!
//! Filenames arrive from untrusted clients and become a single path component
//! under the client's storage directory, so anything that could escape that
//! directory or collide with a device name is refused.

/// Maximum length for stored filenames in bytes
pub const MAX_FILENAME_LENGTH: usize = 254;

/// Device names that cannot be used as a filename stem on common filesystems
pub const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Punctuation allowed in filenames in addition to ASCII letters and digits
const ALLOWED_PUNCTUATION: &[char] = &['.', '_', '-', ' ', '&', '#'];

/// Validation error for filenames
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("filename is empty")]
    Empty,
    #[error("filename exceeds {MAX_FILENAME_LENGTH} bytes")]
    TooLong,
    #[error("filename contains a path separator")]
    ContainsPathSeparator,
    #[error("filename contains a parent directory reference")]
    ContainsParentRef,
    #[error("filename contains a null byte")]
    ContainsNull,
    #[error("filename is a reserved device name")]
    ReservedName,
    #[error("filename contains characters outside the allowed set")]
    InvalidCharacters,
    #[error("filename ends with a dot or space")]
    TrailingDotOrSpace,
}

/// Validate a filename for storage
///
/// Checks:
/// - Not empty
/// - Does not exceed maximum length (254 bytes)
/// - No path separators (`/` or `\`)
/// - No `..` sequence anywhere in the name
/// - No null bytes
/// - Stem (text before the first `.`) is not a reserved device name, case-insensitive
/// - Only ASCII letters, digits and `._- &#`
/// - Does not end with `.` or a space
///
/// # Errors
///
/// Returns a `FilenameError` variant describing the validation failure.
pub fn validate_filename(name: &str) -> Result<(), FilenameError> {
    if name.is_empty() {
        return Err(FilenameError::Empty);
    }

    if name.len() > MAX_FILENAME_LENGTH {
        return Err(FilenameError::TooLong);
    }

    if name.contains('/') || name.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }

    if name.contains("..") {
        return Err(FilenameError::ContainsParentRef);
    }

    if name.contains('\0') {
        return Err(FilenameError::ContainsNull);
    }

    let stem = name.split('.').next().unwrap_or(name).trim_end();
    if RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        return Err(FilenameError::ReservedName);
    }

    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(&ch))
    {
        return Err(FilenameError::InvalidCharacters);
    }

    if name.ends_with('.') || name.ends_with(' ') {
        return Err(FilenameError::TrailingDotOrSpace);
    }

    Ok(())
}
