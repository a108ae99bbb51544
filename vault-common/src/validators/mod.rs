//! Input validation functions
//!
//! Validators shared between client and server: clients can use them for
//! pre-validation, the server uses them for enforcement before any state is
//! created.

mod client_name;
mod filename;

pub use client_name::{ClientNameError, MAX_CLIENT_NAME_LENGTH, validate_client_name};
pub use filename::{FilenameError, MAX_FILENAME_LENGTH, RESERVED_DEVICE_NAMES, validate_filename};
