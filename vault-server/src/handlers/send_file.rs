//! SendFile handler

use std::sync::Arc;

use tracing::debug;
use vault_common::wire::{Response, SendFileRequest};

use super::{HandlerContext, Reply};
use crate::clients::Client;
use crate::error::CoreError;
use crate::transfers::PacketOutcome;

/// Handle one SendFile packet
///
/// Intermediate packets are acknowledged by silence. The packet that
/// completes the file is answered with the server-side checksum.
///
/// # Errors
///
/// Anything the transfer engine reports.
pub fn handle_send_file(
    ctx: &HandlerContext<'_>,
    client: &Arc<Client>,
    payload: &[u8],
) -> Result<Reply, CoreError> {
    let packet = SendFileRequest::decode(payload)?;
    match ctx.engine.handle_packet(client, packet)? {
        PacketOutcome::Pending { .. } => Ok(Reply::silent(client)),
        PacketOutcome::Stored(stored) => {
            debug!(
                client = client.name(),
                file = stored.filename.as_str(),
                crc32 = format_args!("{:08x}", stored.crc32),
                "sending checksum"
            );
            let response = Response::file_checksum(
                &client.id(),
                stored.encrypted_size,
                &stored.filename,
                stored.crc32,
            )?;
            Ok(Reply::send(client, response))
        }
    }
}
