//! Checksum report handlers (CrcOk, CrcInvalidRetry, CrcFailedAbort)

use std::sync::Arc;

use tracing::{info, warn};
use vault_common::RequestCode;
use vault_common::validators::validate_filename;
use vault_common::wire::{FileNameRequest, Response};

use super::{HandlerContext, Reply};
use crate::clients::Client;
use crate::error::CoreError;

/// Handle the client's verdict on a stored file's checksum
///
/// - `CrcOk`: the file is marked verified and acknowledged
/// - `CrcInvalidRetry`: the file is marked unverified; no response, the
///   client resends from packet 1
/// - `CrcFailedAbort`: the file is marked unverified, deleted from storage and
///   acknowledged
///
/// # Errors
///
/// `Protocol` for an invalid filename or a file the server never stored;
/// `Storage` if the metadata update or the deletion fails.
pub fn handle_crc_report(
    ctx: &HandlerContext<'_>,
    client: &Arc<Client>,
    code: RequestCode,
    payload: &[u8],
) -> Result<Reply, CoreError> {
    let request = FileNameRequest::decode(payload)?;
    let filename = request.filename;
    validate_filename(&filename)?;

    let verified = code == RequestCode::CrcOk;
    if !ctx.store.set_file_verified(&client.id(), &filename, verified)? {
        return Err(CoreError::protocol(format!(
            "checksum report for unknown file '{filename}'"
        )));
    }

    match code {
        RequestCode::CrcOk => {
            info!(client = client.name(), file = filename.as_str(), "file verified");
            Ok(Reply::send(client, Response::acknowledge(&client.id())))
        }
        RequestCode::CrcInvalidRetry => {
            warn!(
                client = client.name(),
                file = filename.as_str(),
                "checksum mismatch, awaiting resend"
            );
            Ok(Reply::silent(client))
        }
        RequestCode::CrcFailedAbort => {
            let removed = ctx.engine.storage().delete(&client.id(), &filename)?;
            warn!(
                client = client.name(),
                file = filename.as_str(),
                removed,
                "checksum failed, client gave up; stored file deleted"
            );
            Ok(Reply::send(client, Response::acknowledge(&client.id())))
        }
        other => Err(CoreError::invariant(format!(
            "{} routed to the checksum handler",
            other.as_ref()
        ))),
    }
}
