//! Vault Common Library
//!
//! Wire protocol, framing, checksums and input validators shared by the
//! vault backup server and its clients.

pub mod checksum;
pub mod framing;
pub mod protocol;
pub mod validators;
pub mod wire;

pub use protocol::{ClientId, RequestCode, ResponseCode};

/// Protocol version the server writes into every response header
pub const SERVER_VERSION: u8 = 3;

/// Default TCP port for the backup server
pub const DEFAULT_PORT: u16 = 1357;

/// Buffer size for streaming checksum and file write passes (64KB)
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;
