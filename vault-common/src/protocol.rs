//! Protocol codes, field widths and identifiers
//!
//! Every request carries a numeric code that maps to exactly one server
//! handler, and every response carries one of the codes in [`ResponseCode`].
//! Unknown request codes are rejected before any handler runs.

use std::fmt;

use strum::AsRefStr;

/// Length of a client identifier in bytes
pub const CLIENT_ID_SIZE: usize = 16;

/// Width of the `name` field in Register, SubmitPublicKey and Reconnect payloads
pub const NAME_FIELD_SIZE: usize = 255;

/// Width of the `filename` field in SendFile and CRC payloads
pub const FILENAME_FIELD_SIZE: usize = 255;

/// Width of the `public_key` field in the SubmitPublicKey payload
pub const PUBLIC_KEY_FIELD_SIZE: usize = 160;

/// Length of a symmetric session key in bytes (AES-256)
pub const SESSION_KEY_SIZE: usize = 32;

/// 16-byte client identifier, immutable once assigned
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClientId([u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// Wrap raw identifier bytes
    pub const fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build an identifier from a slice, returning `None` unless it is exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; CLIENT_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Parse a 32-character hex string
    pub fn from_hex(value: &str) -> Option<Self> {
        let bytes = hex::decode(value).ok()?;
        Self::from_slice(&bytes)
    }

    /// Raw identifier bytes
    pub const fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }

    /// Lowercase hex form, used for storage directories and database keys
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.to_hex())
    }
}

/// Request codes sent by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum RequestCode {
    /// Register a new client name
    Register = 1025,
    /// Submit an RSA public key and receive a session key
    SubmitPublicKey = 1026,
    /// Re-establish a session for a known client
    Reconnect = 1027,
    /// One packet of an encrypted file
    SendFile = 1028,
    /// Client checksum matched the server's
    CrcOk = 1029,
    /// Client checksum mismatched, the file will be resent
    CrcInvalidRetry = 1030,
    /// Client checksum mismatched and the client gave up
    CrcFailedAbort = 1031,
}

impl RequestCode {
    /// Numeric wire value
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for RequestCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1025 => Ok(Self::Register),
            1026 => Ok(Self::SubmitPublicKey),
            1027 => Ok(Self::Reconnect),
            1028 => Ok(Self::SendFile),
            1029 => Ok(Self::CrcOk),
            1030 => Ok(Self::CrcInvalidRetry),
            1031 => Ok(Self::CrcFailedAbort),
            other => Err(other),
        }
    }
}

/// Response codes sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum ResponseCode {
    /// Registration accepted, payload carries the client identifier
    RegisterSuccess = 1600,
    /// Registration refused (name taken or invalid), no payload
    RegisterFailed = 1601,
    /// Public key accepted, payload carries the wrapped session key
    PublicKeyAck = 1602,
    /// File stored, payload carries the server-side CRC-32
    FileChecksum = 1603,
    /// Generic acknowledgement
    Acknowledge = 1604,
    /// Reconnect accepted, payload carries a fresh wrapped session key
    ReconnectSuccess = 1605,
    /// Reconnect refused, the client must register again
    ReconnectDenied = 1606,
    /// Generic server error, no payload
    GeneralError = 1607,
}

impl ResponseCode {
    /// Numeric wire value
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1600 => Ok(Self::RegisterSuccess),
            1601 => Ok(Self::RegisterFailed),
            1602 => Ok(Self::PublicKeyAck),
            1603 => Ok(Self::FileChecksum),
            1604 => Ok(Self::Acknowledge),
            1605 => Ok(Self::ReconnectSuccess),
            1606 => Ok(Self::ReconnectDenied),
            1607 => Ok(Self::GeneralError),
            other => Err(other),
        }
    }
}
