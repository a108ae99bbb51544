//! Framing errors

use std::io;
use std::time::Duration;

/// Errors raised while reading or writing frames
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed in the middle of a frame")]
    ConnectionClosed,

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u32, limit: u32 },

    #[error("no data received within {0:?}")]
    IdleTimeout(Duration),

    #[error("frame not completed within {0:?}")]
    FrameTimeout(Duration),
}
