//! Frame writer for sending server responses to a stream

use tokio::io::AsyncWriteExt;

use super::error::FrameError;
use crate::wire::Response;

/// Writes response frames to an async writer
pub struct FrameWriter<W> {
    writer: W,
    version: u8,
}

impl<W> FrameWriter<W> {
    /// Create a new frame writer that stamps `version` into every header
    pub fn new(writer: W, version: u8) -> Self {
        Self { writer, version }
    }

    /// Get a mutable reference to the underlying writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: AsyncWriteExt + Unpin> FrameWriter<W> {
    /// Write a response header and payload, then flush
    pub async fn write_response(&mut self, response: &Response) -> Result<(), FrameError> {
        let header = response.header(self.version).encode();
        self.writer.write_all(&header).await?;
        self.writer.write_all(&response.payload).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
