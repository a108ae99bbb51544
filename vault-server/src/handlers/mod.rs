//! Request handlers
//!
//! One module per request kind. The dispatcher decodes nothing itself: it
//! resolves the client (for every code except Register and Reconnect, which
//! resolve their own) and hands the raw payload to the matching handler.

mod crc;
mod dispatcher;
mod public_key;
mod reconnect;
mod register;
mod send_file;

#[cfg(test)]
pub mod testing;

pub use crc::handle_crc_report;
pub use dispatcher::{Request, RequestDispatcher};
pub use public_key::handle_submit_public_key;
pub use reconnect::handle_reconnect;
pub use register::handle_register;
pub use send_file::handle_send_file;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use vault_common::ClientId;
use vault_common::wire::Response;

use crate::clients::{Client, ClientRegistry};
use crate::db::{ClientRecord, MetadataStore};
use crate::error::CoreError;
use crate::transfers::TransferEngine;

/// Shared resources passed to every handler
pub struct HandlerContext<'a> {
    pub registry: &'a ClientRegistry,
    pub engine: &'a TransferEngine,
    pub store: &'a dyn MetadataStore,
}

impl HandlerContext<'_> {
    /// Find a client in memory, or re-admit it from the metadata store
    ///
    /// Clients dropped by registry maintenance come back with their name and
    /// public key but no session key. A stored record whose name is now held
    /// by another client in memory cannot be re-admitted and is treated as
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn find_client(&self, id: &ClientId) -> Result<Option<Arc<Client>>, CoreError> {
        if let Some(client) = self.registry.lookup_by_id(id) {
            return Ok(Some(client));
        }
        let Some(record) = self.store.load_client(id)? else {
            return Ok(None);
        };
        match self.registry.register(record.id, &record.name, record.public_key) {
            Ok(client) => {
                debug!(client = client.name(), "client rehydrated from metadata store");
                Ok(Some(client))
            }
            Err(CoreError::ClientConflict(reason)) => {
                warn!(
                    client = record.name.as_str(),
                    id = %id,
                    reason = reason.as_str(),
                    "stored client not rehydrated: name taken"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a client's current identity and key with `last_seen = now`
    ///
    /// # Errors
    ///
    /// Propagates metadata store failures.
    pub fn save_client(&self, client: &Client) -> Result<(), CoreError> {
        self.store.save_client(&ClientRecord {
            id: client.id(),
            name: client.name().to_string(),
            public_key: client.public_key(),
            last_seen: Utc::now(),
        })?;
        Ok(())
    }

    /// Refresh activity in memory and, best effort, in the store
    pub fn record_activity(&self, client: &Client) {
        client.touch();
        if let Err(e) = self.save_client(client) {
            warn!(client = client.name(), error = %e, "failed to persist last_seen");
        }
    }
}

/// What a handler produced
pub struct Reply {
    /// Response to write, if the request expects one
    pub response: Option<Response>,
    /// Client the request acted for, whose activity is recorded
    pub client: Option<Arc<Client>>,
}

impl Reply {
    /// Respond on behalf of `client`
    pub fn send(client: &Arc<Client>, response: Response) -> Self {
        Self {
            response: Some(response),
            client: Some(Arc::clone(client)),
        }
    }

    /// Succeed on behalf of `client` without responding
    pub fn silent(client: &Arc<Client>) -> Self {
        Self {
            response: None,
            client: Some(Arc::clone(client)),
        }
    }

    /// Respond without attributing activity to any client
    pub fn anonymous(response: Response) -> Self {
        Self {
            response: Some(response),
            client: None,
        }
    }
}
