//! In-memory metadata store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use vault_common::ClientId;

use super::{ClientRecord, FileRecord, MetadataStore, StoreError};

#[derive(Default)]
struct Tables {
    clients: HashMap<ClientId, ClientRecord>,
    files: HashMap<(ClientId, String), FileRecord>,
}

/// Metadata store that lives only as long as the process
///
/// Enforces the same uniqueness rules as the SQLite schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store lock poisoned")
    }
}

impl MetadataStore for MemoryStore {
    fn save_client(&self, record: &ClientRecord) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if tables
            .clients
            .values()
            .any(|c| c.name == record.name && c.id != record.id)
        {
            return Err(StoreError::Conflict(format!(
                "client name '{}' already exists",
                record.name
            )));
        }

        let mut record = record.clone();
        if record.public_key.is_none()
            && let Some(existing) = tables.clients.get(&record.id)
        {
            record.public_key = existing.public_key.clone();
        }
        tables.clients.insert(record.id, record);
        Ok(())
    }

    fn load_client(&self, id: &ClientId) -> Result<Option<ClientRecord>, StoreError> {
        Ok(self.lock().clients.get(id).cloned())
    }

    fn load_client_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StoreError> {
        Ok(self
            .lock()
            .clients
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    fn load_all_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        let mut clients: Vec<ClientRecord> = self.lock().clients.values().cloned().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    fn save_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.lock().files.insert(
            (record.client_id, record.file_name.clone()),
            record.clone(),
        );
        Ok(())
    }

    fn set_file_verified(
        &self,
        client_id: &ClientId,
        file_name: &str,
        verified: bool,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.files.get_mut(&(*client_id, file_name.to_string())) {
            Some(record) => {
                record.verified = verified;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load_file(
        &self,
        client_id: &ClientId,
        file_name: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        Ok(self
            .lock()
            .files
            .get(&(*client_id, file_name.to_string()))
            .cloned())
    }
}
