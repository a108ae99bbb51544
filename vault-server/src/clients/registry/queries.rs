//! Query methods for ClientRegistry

use std::sync::Arc;

use vault_common::ClientId;

use super::ClientRegistry;
use crate::clients::Client;

impl ClientRegistry {
    /// Find a client by id, refreshing its activity time on a hit
    pub fn lookup_by_id(&self, id: &ClientId) -> Option<Arc<Client>> {
        let client = self.get(id)?;
        client.touch();
        Some(client)
    }

    /// Find a client by name, refreshing its activity time on a hit
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<Client>> {
        let client = {
            let index = self.lock_index();
            let id = index.by_name.get(name)?;
            index.by_id.get(id).cloned()
        }?;
        client.touch();
        Some(client)
    }

    /// Find a client by id without counting it as activity
    pub fn get(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.lock_index().by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_index().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_index().by_id.is_empty()
    }
}
