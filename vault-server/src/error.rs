//! Core error taxonomy
//!
//! Every request failure is classified into one of these variants, logged at
//! the dispatcher boundary, and translated into a response code. None of them
//! terminate the connection.

use std::io;

use vault_common::ResponseCode;
use vault_common::validators::{ClientNameError, FilenameError};
use vault_common::wire::WireError;

use crate::crypto::CryptoError;
use crate::db::StoreError;

/// Errors raised by request handling in the core
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed or inconsistent wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Identity uniqueness violation
    #[error("client conflict: {0}")]
    ClientConflict(String),

    /// Decryption failure or plaintext size mismatch
    #[error("content error: {0}")]
    Content(String),

    /// Admission or memory refusal by the transfer broker
    #[error("resource limit: {0}")]
    Resource(String),

    /// Filesystem or metadata persistence failure
    #[error("storage error: {0}")]
    Storage(String),

    /// A state that should be impossible
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl CoreError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self::Content(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InternalInvariant(message.into())
    }

    /// Short, stable name of the variant for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::ClientConflict(_) => "client_conflict",
            Self::Content(_) => "content",
            Self::Resource(_) => "resource",
            Self::Storage(_) => "storage",
            Self::InternalInvariant(_) => "internal_invariant",
        }
    }

    /// Response code sent to the client for this error
    ///
    /// Identity conflicts have a dedicated code; everything else collapses to
    /// the generic error so the client learns nothing about server internals.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::ClientConflict(_) => ResponseCode::RegisterFailed,
            _ => ResponseCode::GeneralError,
        }
    }
}

impl From<WireError> for CoreError {
    fn from(e: WireError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<FilenameError> for CoreError {
    fn from(e: FilenameError) -> Self {
        Self::Protocol(format!("invalid filename: {e}"))
    }
}

impl From<ClientNameError> for CoreError {
    fn from(e: ClientNameError) -> Self {
        Self::Protocol(format!("invalid client name: {e}"))
    }
}

impl From<CryptoError> for CoreError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Decrypt => Self::Content(e.to_string()),
            CryptoError::InvalidPublicKey(_) | CryptoError::Wrap(_) => Self::Protocol(e.to_string()),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<io::Error> for CoreError {
    fn from(e: io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
