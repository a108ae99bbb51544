//! Binary payload layouts
//!
//! All multi-byte integers are little-endian. String fields have a fixed
//! declared width and are null-terminated and zero-padded to that width.
//! Decoders are strict: a payload that is shorter or longer than its layout
//! is rejected rather than silently truncated.

use crate::protocol::{
    CLIENT_ID_SIZE, ClientId, FILENAME_FIELD_SIZE, NAME_FIELD_SIZE, PUBLIC_KEY_FIELD_SIZE,
    ResponseCode,
};

/// Size of the request header: client_id[16], version:u8, code:u16, payload_size:u32
pub const REQUEST_HEADER_SIZE: usize = CLIENT_ID_SIZE + 1 + 2 + 4;

/// Size of the response header: version:u8, code:u16, payload_size:u32
pub const RESPONSE_HEADER_SIZE: usize = 1 + 2 + 4;

/// Size of the fixed part of a SendFile payload (everything before `content`)
pub const SEND_FILE_PREFIX_SIZE: usize = 4 + 4 + 2 + 2 + FILENAME_FIELD_SIZE;

/// Errors raised while decoding or encoding payloads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload has {0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("string field of width {width} is not null-terminated")]
    Unterminated { width: usize },

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("string of {len} bytes does not fit a field of width {width}")]
    FieldOverflow { len: usize, width: usize },

    #[error("declared content size {declared} does not match the {actual} bytes received")]
    ContentSizeMismatch { declared: u32, actual: usize },
}

// =============================================================================
// Field Helpers
// =============================================================================

/// Sequential reader over a payload slice
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(WireError::Truncated {
                expected: end,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn fixed_str(&mut self, width: usize) -> Result<String, WireError> {
        read_fixed_str(self.take(width)?)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn finish(self) -> Result<(), WireError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            extra => Err(WireError::TrailingBytes(extra)),
        }
    }
}

/// Decode a null-terminated, zero-padded string field
pub fn read_fixed_str(field: &[u8]) -> Result<String, WireError> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or(WireError::Unterminated { width: field.len() })?;
    String::from_utf8(field[..end].to_vec()).map_err(|_| WireError::InvalidUtf8)
}

/// Append `value` as a null-terminated field zero-padded to `width`
pub fn write_fixed_str(out: &mut Vec<u8>, value: &str, width: usize) -> Result<(), WireError> {
    let bytes = value.as_bytes();
    // One byte is always reserved for the terminator
    if bytes.len() >= width {
        return Err(WireError::FieldOverflow {
            len: bytes.len(),
            width,
        });
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + (width - bytes.len()), 0);
    Ok(())
}

// =============================================================================
// Headers
// =============================================================================

/// Header preceding every client request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl RequestHeader {
    /// Decode a header from its fixed 23-byte form
    pub fn decode(bytes: &[u8; REQUEST_HEADER_SIZE]) -> Self {
        let mut client_id = [0u8; CLIENT_ID_SIZE];
        client_id.copy_from_slice(&bytes[..CLIENT_ID_SIZE]);
        let rest = &bytes[CLIENT_ID_SIZE..];
        Self {
            client_id: ClientId::from_bytes(client_id),
            version: rest[0],
            code: u16::from_le_bytes([rest[1], rest[2]]),
            payload_size: u32::from_le_bytes([rest[3], rest[4], rest[5], rest[6]]),
        }
    }

    /// Encode the header into its fixed 23-byte form
    pub fn encode(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut out = [0u8; REQUEST_HEADER_SIZE];
        out[..CLIENT_ID_SIZE].copy_from_slice(self.client_id.as_bytes());
        out[CLIENT_ID_SIZE] = self.version;
        out[CLIENT_ID_SIZE + 1..CLIENT_ID_SIZE + 3].copy_from_slice(&self.code.to_le_bytes());
        out[CLIENT_ID_SIZE + 3..].copy_from_slice(&self.payload_size.to_le_bytes());
        out
    }
}

/// Header preceding every server response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl ResponseHeader {
    /// Decode a header from its fixed 7-byte form
    pub fn decode(bytes: &[u8; RESPONSE_HEADER_SIZE]) -> Self {
        Self {
            version: bytes[0],
            code: u16::from_le_bytes([bytes[1], bytes[2]]),
            payload_size: u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
        }
    }

    /// Encode the header into its fixed 7-byte form
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut out = [0u8; RESPONSE_HEADER_SIZE];
        out[0] = self.version;
        out[1..3].copy_from_slice(&self.code.to_le_bytes());
        out[3..].copy_from_slice(&self.payload_size.to_le_bytes());
        out
    }
}

// =============================================================================
// Request Payloads
// =============================================================================

/// Register payload: `name[255]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub name: String,
}

impl RegisterRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);
        let name = reader.fixed_str(NAME_FIELD_SIZE)?;
        reader.finish()?;
        Ok(Self { name })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(NAME_FIELD_SIZE);
        write_fixed_str(&mut out, &self.name, NAME_FIELD_SIZE)?;
        Ok(out)
    }
}

/// SubmitPublicKey payload: `name[255]`, `public_key[160]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRequest {
    pub name: String,
    pub public_key: Vec<u8>,
}

impl PublicKeyRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);
        let name = reader.fixed_str(NAME_FIELD_SIZE)?;
        let public_key = reader.take(PUBLIC_KEY_FIELD_SIZE)?.to_vec();
        reader.finish()?;
        Ok(Self { name, public_key })
    }

    /// Encode the payload, zero-padding the key to the field width
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.public_key.len() > PUBLIC_KEY_FIELD_SIZE {
            return Err(WireError::FieldOverflow {
                len: self.public_key.len(),
                width: PUBLIC_KEY_FIELD_SIZE,
            });
        }
        let mut out = Vec::with_capacity(NAME_FIELD_SIZE + PUBLIC_KEY_FIELD_SIZE);
        write_fixed_str(&mut out, &self.name, NAME_FIELD_SIZE)?;
        out.extend_from_slice(&self.public_key);
        out.resize(NAME_FIELD_SIZE + PUBLIC_KEY_FIELD_SIZE, 0);
        Ok(out)
    }
}

/// Reconnect payload: `name[255]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectRequest {
    pub name: String,
}

impl ReconnectRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);
        let name = reader.fixed_str(NAME_FIELD_SIZE)?;
        reader.finish()?;
        Ok(Self { name })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(NAME_FIELD_SIZE);
        write_fixed_str(&mut out, &self.name, NAME_FIELD_SIZE)?;
        Ok(out)
    }
}

/// One packet of an encrypted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFileRequest {
    /// Length of `content` in bytes
    pub encrypted_size: u32,
    /// Declared plaintext size of the whole file
    pub original_size: u32,
    /// 1-based packet number
    pub packet_number: u16,
    pub total_packets: u16,
    pub filename: String,
    pub content: Vec<u8>,
}

impl SendFileRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);
        let encrypted_size = reader.u32()?;
        let original_size = reader.u32()?;
        let packet_number = reader.u16()?;
        let total_packets = reader.u16()?;
        let filename = reader.fixed_str(FILENAME_FIELD_SIZE)?;
        let content = reader.rest();

        if content.len() != encrypted_size as usize {
            return Err(WireError::ContentSizeMismatch {
                declared: encrypted_size,
                actual: content.len(),
            });
        }

        Ok(Self {
            encrypted_size,
            original_size,
            packet_number,
            total_packets,
            filename,
            content: content.to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(SEND_FILE_PREFIX_SIZE + self.content.len());
        out.extend_from_slice(&self.encrypted_size.to_le_bytes());
        out.extend_from_slice(&self.original_size.to_le_bytes());
        out.extend_from_slice(&self.packet_number.to_le_bytes());
        out.extend_from_slice(&self.total_packets.to_le_bytes());
        write_fixed_str(&mut out, &self.filename, FILENAME_FIELD_SIZE)?;
        out.extend_from_slice(&self.content);
        Ok(out)
    }
}

/// CrcOk / CrcInvalidRetry / CrcFailedAbort payload: `filename[255]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameRequest {
    pub filename: String,
}

impl FileNameRequest {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);
        let filename = reader.fixed_str(FILENAME_FIELD_SIZE)?;
        reader.finish()?;
        Ok(Self { filename })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(FILENAME_FIELD_SIZE);
        write_fixed_str(&mut out, &self.filename, FILENAME_FIELD_SIZE)?;
        Ok(out)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// A response code with its encoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub payload: Vec<u8>,
}

impl Response {
    fn with_client_id(code: ResponseCode, client_id: &ClientId, extra: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(CLIENT_ID_SIZE + extra.len());
        payload.extend_from_slice(client_id.as_bytes());
        payload.extend_from_slice(extra);
        Self { code, payload }
    }

    pub fn register_success(client_id: &ClientId) -> Self {
        Self::with_client_id(ResponseCode::RegisterSuccess, client_id, &[])
    }

    pub fn register_failed() -> Self {
        Self {
            code: ResponseCode::RegisterFailed,
            payload: Vec::new(),
        }
    }

    pub fn public_key_ack(client_id: &ClientId, wrapped_session_key: &[u8]) -> Self {
        Self::with_client_id(ResponseCode::PublicKeyAck, client_id, wrapped_session_key)
    }

    pub fn reconnect_success(client_id: &ClientId, wrapped_session_key: &[u8]) -> Self {
        Self::with_client_id(ResponseCode::ReconnectSuccess, client_id, wrapped_session_key)
    }

    pub fn reconnect_denied(client_id: &ClientId) -> Self {
        Self::with_client_id(ResponseCode::ReconnectDenied, client_id, &[])
    }

    pub fn acknowledge(client_id: &ClientId) -> Self {
        Self::with_client_id(ResponseCode::Acknowledge, client_id, &[])
    }

    pub fn general_error() -> Self {
        Self {
            code: ResponseCode::GeneralError,
            payload: Vec::new(),
        }
    }

    /// File-checksum response: `client_id[16]`, `encrypted_size:u32`, `filename[255]`, `crc32:u32`
    pub fn file_checksum(
        client_id: &ClientId,
        encrypted_size: u32,
        filename: &str,
        crc32: u32,
    ) -> Result<Self, WireError> {
        let mut extra = Vec::with_capacity(4 + FILENAME_FIELD_SIZE + 4);
        extra.extend_from_slice(&encrypted_size.to_le_bytes());
        write_fixed_str(&mut extra, filename, FILENAME_FIELD_SIZE)?;
        extra.extend_from_slice(&crc32.to_le_bytes());
        Ok(Self::with_client_id(
            ResponseCode::FileChecksum,
            client_id,
            &extra,
        ))
    }

    /// Header for this response, stamped with the given server version
    pub fn header(&self, version: u8) -> ResponseHeader {
        ResponseHeader {
            version,
            code: self.code.as_u16(),
            payload_size: self.payload.len() as u32,
        }
    }
}

/// Decoded File-checksum response, used by clients and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChecksumResponse {
    pub client_id: ClientId,
    pub encrypted_size: u32,
    pub filename: String,
    pub crc32: u32,
}

impl FileChecksumResponse {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut reader = PayloadReader::new(payload);
        let id_bytes = reader.take(CLIENT_ID_SIZE)?;
        let client_id = ClientId::from_slice(id_bytes).ok_or(WireError::Truncated {
            expected: CLIENT_ID_SIZE,
            actual: id_bytes.len(),
        })?;
        let encrypted_size = reader.u32()?;
        let filename = reader.fixed_str(FILENAME_FIELD_SIZE)?;
        let crc32 = reader.u32()?;
        reader.finish()?;
        Ok(Self {
            client_id,
            encrypted_size,
            filename,
            crc32,
        })
    }
}
