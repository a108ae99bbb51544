//! Client connection handling

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, warn};
use vault_common::SERVER_VERSION;
use vault_common::framing::{FrameError, FrameReader, FrameWriter};

use crate::config::ServerConfig;
use crate::handlers::{Request, RequestDispatcher};

/// Parameters for handling a connection
pub struct ConnectionParams {
    pub peer_addr: SocketAddr,
    pub dispatcher: Arc<RequestDispatcher>,
    pub max_payload_size: u32,
    pub idle_timeout: Duration,
    pub frame_timeout: Duration,
}

impl ConnectionParams {
    pub fn new(
        peer_addr: SocketAddr,
        dispatcher: Arc<RequestDispatcher>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            peer_addr,
            dispatcher,
            max_payload_size: config.max_payload_size,
            idle_timeout: config.idle_timeout,
            frame_timeout: config.frame_timeout,
        }
    }
}

/// Serve one client connection until it closes, times out or breaks framing
///
/// Requests are handled strictly in order. Each one is dispatched on a
/// blocking thread since the core and its metadata store are synchronous.
///
/// # Errors
///
/// Returns the framing or I/O error that ended the connection. A clean close
/// between requests is `Ok(())`.
pub async fn handle_connection<S>(socket: S, params: ConnectionParams) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ConnectionParams {
        peer_addr,
        dispatcher,
        max_payload_size,
        idle_timeout,
        frame_timeout,
    } = params;

    let (reader, writer) = tokio::io::split(socket);
    let mut frame_reader = FrameReader::new(BufReader::new(reader), max_payload_size);
    let mut frame_writer = FrameWriter::new(writer, SERVER_VERSION);

    debug!(peer = %peer_addr, "connection opened");

    loop {
        let Some(received) = frame_reader
            .read_request_with_timeout(idle_timeout, frame_timeout)
            .await?
        else {
            debug!(peer = %peer_addr, "connection closed by client");
            return Ok(());
        };

        let request = Request {
            client_id: received.header.client_id,
            version: received.header.version,
            code: received.header.code,
            payload: received.payload,
        };
        debug!(
            peer = %peer_addr,
            client = %request.client_id,
            code = request.code,
            payload_size = request.payload.len(),
            "request received"
        );

        let dispatcher = Arc::clone(&dispatcher);
        let response = tokio::task::spawn_blocking(move || dispatcher.dispatch(request))
            .await
            .map_err(|e| {
                FrameError::Io(io::Error::other(format!("request handler panicked: {e}")))
            })?;

        if let Some(response) = response {
            frame_writer.write_response(&response).await?;
        }
    }
}

/// Log how a connection ended
pub fn log_connection_end(result: &Result<(), FrameError>, peer_addr: SocketAddr) {
    match result {
        Ok(()) => {}
        Err(FrameError::ConnectionClosed) => {
            debug!(peer = %peer_addr, "connection dropped mid-request")
        }
        Err(e @ (FrameError::IdleTimeout(_) | FrameError::FrameTimeout(_))) => {
            debug!(peer = %peer_addr, error = %e, "connection timed out")
        }
        Err(FrameError::Io(io_err))
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ) =>
        {
            debug!(peer = %peer_addr, error = %io_err, "connection reset")
        }
        Err(e) => warn!(peer = %peer_addr, error = %e, "connection closed on error"),
    }
}
