//! Reconnect handler

use tracing::{info, warn};
use vault_common::ClientId;
use vault_common::wire::{ReconnectRequest, Response};

use super::{HandlerContext, Reply};
use crate::crypto::{SessionKey, wrap_session_key};
use crate::error::CoreError;

/// Handle a Reconnect request
///
/// Every refusal (unknown id, wrong name, no key on record, unusable key) is
/// answered with ReconnectDenied so the client knows to register again.
/// Success always rotates the session key.
///
/// # Errors
///
/// Only malformed payloads and store failures surface as errors.
pub fn handle_reconnect(
    ctx: &HandlerContext<'_>,
    header_id: ClientId,
    payload: &[u8],
) -> Result<Reply, CoreError> {
    let request = ReconnectRequest::decode(payload)?;
    let denied = || Ok(Reply::anonymous(Response::reconnect_denied(&header_id)));

    let Some(client) = ctx.find_client(&header_id)? else {
        warn!(client = request.name.as_str(), id = %header_id, "reconnect denied: unknown client");
        return denied();
    };
    if client.name() != request.name {
        warn!(
            client = client.name(),
            claimed = request.name.as_str(),
            "reconnect denied: name mismatch"
        );
        return denied();
    }
    let Some(public_key) = client.public_key() else {
        warn!(client = client.name(), "reconnect denied: no public key on record");
        return denied();
    };

    let session_key = SessionKey::generate();
    let wrapped = match wrap_session_key(&public_key, &session_key) {
        Ok(wrapped) => wrapped,
        Err(e) => {
            warn!(client = client.name(), error = %e, "reconnect denied: stored key unusable");
            return denied();
        }
    };
    client.replace_session_key(session_key);

    info!(client = client.name(), "client reconnected, session key rotated");
    Ok(Reply::send(
        &client,
        Response::reconnect_success(&client.id(), &wrapped),
    ))
}
