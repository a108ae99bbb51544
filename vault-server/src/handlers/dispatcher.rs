//! Request routing and the error boundary

use std::sync::Arc;

use tracing::{error, warn};
use vault_common::wire::Response;
use vault_common::{ClientId, RequestCode};

use super::{
    HandlerContext, Reply, handle_crc_report, handle_reconnect, handle_register,
    handle_send_file, handle_submit_public_key,
};
use crate::clients::{Client, ClientRegistry};
use crate::db::MetadataStore;
use crate::error::CoreError;
use crate::transfers::TransferEngine;

/// One decoded request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload: Vec<u8>,
}

/// Routes requests to handlers and turns every error into a response
///
/// All operations are synchronous; the connection layer runs them on a
/// blocking thread.
pub struct RequestDispatcher {
    registry: Arc<ClientRegistry>,
    engine: Arc<TransferEngine>,
    store: Arc<dyn MetadataStore>,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ClientRegistry>,
        engine: Arc<TransferEngine>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            registry,
            engine,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<TransferEngine> {
        &self.engine
    }

    fn context(&self) -> HandlerContext<'_> {
        HandlerContext {
            registry: &self.registry,
            engine: &self.engine,
            store: self.store.as_ref(),
        }
    }

    /// Handle one request, returning the response to write, if any
    ///
    /// Never fails: errors are logged here and mapped to a failure response.
    pub fn dispatch(&self, request: Request) -> Option<Response> {
        let Ok(code) = RequestCode::try_from(request.code) else {
            warn!(
                client = %request.client_id,
                code = request.code,
                "unknown request code"
            );
            return Some(Response::general_error());
        };

        let ctx = self.context();
        match Self::route(&ctx, code, &request) {
            Ok(reply) => {
                if let Some(client) = &reply.client {
                    ctx.record_activity(client);
                }
                reply.response
            }
            Err(e) => {
                let name = self
                    .registry
                    .get(&request.client_id)
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| request.client_id.to_hex());
                match &e {
                    CoreError::Storage(_) | CoreError::InternalInvariant(_) => error!(
                        client = name.as_str(),
                        request = code.as_ref(),
                        kind = e.kind(),
                        error = %e,
                        "request failed"
                    ),
                    _ => warn!(
                        client = name.as_str(),
                        request = code.as_ref(),
                        kind = e.kind(),
                        error = %e,
                        "request failed"
                    ),
                }
                Some(Response {
                    code: e.response_code(),
                    payload: Vec::new(),
                })
            }
        }
    }

    fn route(
        ctx: &HandlerContext<'_>,
        code: RequestCode,
        request: &Request,
    ) -> Result<Reply, CoreError> {
        let payload = &request.payload;
        match code {
            RequestCode::Register => handle_register(ctx, request.client_id, payload),
            RequestCode::Reconnect => handle_reconnect(ctx, request.client_id, payload),
            RequestCode::SubmitPublicKey => {
                let client = Self::resolve(ctx, &request.client_id)?;
                handle_submit_public_key(ctx, &client, payload)
            }
            RequestCode::SendFile => {
                let client = Self::resolve(ctx, &request.client_id)?;
                handle_send_file(ctx, &client, payload)
            }
            RequestCode::CrcOk | RequestCode::CrcInvalidRetry | RequestCode::CrcFailedAbort => {
                let client = Self::resolve(ctx, &request.client_id)?;
                handle_crc_report(ctx, &client, code, payload)
            }
        }
    }

    /// Resolve the client a non-registration request acts for
    fn resolve(ctx: &HandlerContext<'_>, id: &ClientId) -> Result<Arc<Client>, CoreError> {
        ctx.find_client(id)?
            .ok_or_else(|| CoreError::invariant(format!("request from unknown client {id}")))
    }
}
