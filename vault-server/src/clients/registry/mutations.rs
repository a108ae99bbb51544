//! Mutation methods for ClientRegistry

use std::sync::Arc;

use tracing::{debug, info};
use vault_common::ClientId;

use super::ClientRegistry;
use crate::clients::Client;
use crate::error::CoreError;
use crate::transfers::{RemovalReason, TransferKey};

impl ClientRegistry {
    /// Register a client, or return the existing one for the same `(id, name)`
    ///
    /// A supplied public key replaces the stored one; `None` never clears an
    /// existing key.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ClientConflict` if `id` is known under a different
    /// name or `name` is bound to a different id.
    pub fn register(
        &self,
        id: ClientId,
        name: &str,
        public_key: Option<Vec<u8>>,
    ) -> Result<Arc<Client>, CoreError> {
        let mut index = self.lock_index();

        if let Some(existing) = index.by_id.get(&id) {
            if existing.name() != name {
                return Err(CoreError::ClientConflict(format!(
                    "client {id} is registered as '{}'",
                    existing.name()
                )));
            }
            if let Some(key) = public_key {
                existing.set_public_key(key);
            }
            return Ok(Arc::clone(existing));
        }

        if index.by_name.contains_key(name) {
            return Err(CoreError::ClientConflict(format!(
                "name '{name}' belongs to another client"
            )));
        }

        let client = Arc::new(Client::new(id, name.to_string(), public_key));
        index.by_name.insert(name.to_string(), id);
        index.by_id.insert(id, Arc::clone(&client));
        debug!(client = name, id = %id, "client added to registry");
        Ok(client)
    }

    /// Drop a client from memory, releasing its transfers
    ///
    /// Returns `true` if the client was present.
    pub fn remove(&self, id: &ClientId) -> bool {
        let removed = {
            let mut index = self.lock_index();
            let removed = index.by_id.remove(id);
            if let Some(client) = &removed {
                index.by_name.remove(client.name());
            }
            removed
        };

        match removed {
            Some(client) => {
                self.release_transfers(&client, RemovalReason::ClientExpired);
                true
            }
            None => false,
        }
    }

    /// Clear all in-memory state
    ///
    /// Persistence is untouched; every broker entry owned by a client is released.
    pub fn shutdown(&self) {
        let clients: Vec<Arc<Client>> = {
            let mut index = self.lock_index();
            index.by_name.clear();
            index.by_id.drain().map(|(_, client)| client).collect()
        };

        let mut released = 0;
        for client in &clients {
            released += self.release_transfers(client, RemovalReason::Shutdown);
        }
        info!(
            clients = clients.len(),
            transfers = released,
            "client registry cleared"
        );
    }

    /// Discard every in-flight transfer of `client` and its broker entries
    pub(super) fn release_transfers(&self, client: &Client, reason: RemovalReason) -> usize {
        let mut state = client.lock_state();
        let count = state.transfers.len();
        for (filename, _) in state.transfers.drain() {
            self.broker
                .remove(&TransferKey::new(client.id(), &filename), reason);
        }
        count
    }
}
