//! Request/response framing over async byte streams
//!
//! Requests are a fixed 23-byte header followed by `payload_size` bytes.
//! Responses are a fixed 7-byte header followed by the payload. There is no
//! terminator or magic: the header length fields are authoritative, so the
//! reader enforces a maximum payload size before allocating.

mod error;
mod reader;
mod writer;

pub use error::FrameError;
pub use reader::{DEFAULT_FRAME_TIMEOUT, DEFAULT_IDLE_TIMEOUT, FrameReader, ReceivedRequest};
pub use writer::FrameWriter;

/// Default upper bound on a single request payload (16MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
