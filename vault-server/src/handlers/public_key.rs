//! SubmitPublicKey handler

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use vault_common::wire::{PublicKeyRequest, Response};

use super::{HandlerContext, Reply};
use crate::clients::Client;
use crate::crypto::{SessionKey, wrap_session_key};
use crate::db::ClientRecord;
use crate::error::CoreError;

/// Handle a SubmitPublicKey request
///
/// Binds the key to the client, generates a fresh session key and returns it
/// wrapped under the submitted key. The key is persisted before the session
/// key is installed, so a storage failure leaves the previous session intact.
///
/// # Errors
///
/// `Protocol` if the payload is malformed, the name does not match the
/// client, or the key cannot be used for wrapping; `Storage` if the key cannot
/// be persisted.
pub fn handle_submit_public_key(
    ctx: &HandlerContext<'_>,
    client: &Arc<Client>,
    payload: &[u8],
) -> Result<Reply, CoreError> {
    let request = PublicKeyRequest::decode(payload)?;
    if request.name != client.name() {
        return Err(CoreError::protocol(format!(
            "public key submitted for '{}' on the connection of '{}'",
            request.name,
            client.name()
        )));
    }

    let session_key = SessionKey::generate();
    let wrapped = wrap_session_key(&request.public_key, &session_key)?;

    ctx.store.save_client(&ClientRecord {
        id: client.id(),
        name: client.name().to_string(),
        public_key: Some(request.public_key.clone()),
        last_seen: Utc::now(),
    })?;
    client.set_public_key(request.public_key);
    client.replace_session_key(session_key);

    info!(client = client.name(), "public key accepted, session key issued");
    Ok(Reply::send(
        client,
        Response::public_key_ack(&client.id(), &wrapped),
    ))
}
