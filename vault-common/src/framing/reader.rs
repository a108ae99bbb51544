//! Frame reader for parsing client requests from a stream

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use super::error::FrameError;
use crate::wire::{REQUEST_HEADER_SIZE, RequestHeader};

/// Default timeout for completing a frame once the first byte is received
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// Default idle timeout while waiting for the first byte of a request
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// A complete request: decoded header plus raw payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    pub header: RequestHeader,
    pub payload: Vec<u8>,
}

/// Reads request frames from an async reader
pub struct FrameReader<R> {
    reader: R,
    max_payload_size: u32,
}

impl<R> FrameReader<R> {
    /// Create a new frame reader that refuses payloads above `max_payload_size`
    pub fn new(reader: R, max_payload_size: u32) -> Self {
        Self {
            reader,
            max_payload_size,
        }
    }

    /// Get a mutable reference to the underlying reader
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

impl<R: AsyncReadExt + Unpin> FrameReader<R> {
    /// Read the next request from the stream
    ///
    /// Returns `Ok(None)` if the connection is cleanly closed before a new
    /// request starts. This method has no timeout.
    pub async fn read_request(&mut self) -> Result<Option<ReceivedRequest>, FrameError> {
        let first_byte = match self.read_byte_allow_eof().await? {
            Some(b) => b,
            None => return Ok(None),
        };
        self.read_request_after_first_byte(first_byte).await.map(Some)
    }

    /// Read the next request, bounding both the idle wait and the frame body
    ///
    /// `idle_timeout` applies while waiting for the first byte; once it
    /// arrives the rest of the frame must complete within `frame_timeout`.
    pub async fn read_request_with_timeout(
        &mut self,
        idle_timeout: Duration,
        frame_timeout: Duration,
    ) -> Result<Option<ReceivedRequest>, FrameError> {
        let first_byte = match timeout(idle_timeout, self.read_byte_allow_eof()).await {
            Ok(Ok(Some(b))) => b,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(FrameError::IdleTimeout(idle_timeout)),
        };

        match timeout(frame_timeout, self.read_request_after_first_byte(first_byte)).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(FrameError::FrameTimeout(frame_timeout)),
        }
    }

    async fn read_request_after_first_byte(
        &mut self,
        first_byte: u8,
    ) -> Result<ReceivedRequest, FrameError> {
        let mut header_bytes = [0u8; REQUEST_HEADER_SIZE];
        header_bytes[0] = first_byte;
        self.read_exact(&mut header_bytes[1..]).await?;
        let header = RequestHeader::decode(&header_bytes);

        // Check the declared size before allocating anything for it
        if header.payload_size > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: header.payload_size,
                limit: self.max_payload_size,
            });
        }

        let mut payload = vec![0u8; header.payload_size as usize];
        self.read_exact(&mut payload).await?;

        Ok(ReceivedRequest { header, payload })
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FrameError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(FrameError::ConnectionClosed)
            }
            Err(e) => Err(FrameError::Io(e)),
        }
    }

    /// Read a single byte, returning `None` on a clean EOF
    async fn read_byte_allow_eof(&mut self) -> Result<Option<u8>, FrameError> {
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf).await? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }
}
