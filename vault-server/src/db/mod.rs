//! Metadata persistence
//!
//! The core talks to persistence through the synchronous [`MetadataStore`]
//! trait. [`MemoryStore`] keeps everything in process memory; [`SqliteStore`]
//! persists to SQLite through sqlx.

mod memory;
pub mod sql;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use vault_common::ClientId;

/// Errors raised by metadata stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("constraint violated: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Persisted client identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub public_key: Option<Vec<u8>>,
    pub last_seen: DateTime<Utc>,
}

/// Persisted metadata of one stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub client_id: ClientId,
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub crc32: u32,
    pub verified: bool,
}

/// Synchronous persistence used by the request core
///
/// Implementations must be callable from any thread. Async-backed stores are
/// only called from blocking threads, never from inside a runtime worker.
pub trait MetadataStore: Send + Sync {
    /// Insert or update a client; a `None` public key keeps the stored one
    fn save_client(&self, record: &ClientRecord) -> Result<(), StoreError>;

    fn load_client(&self, id: &ClientId) -> Result<Option<ClientRecord>, StoreError>;

    fn load_client_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StoreError>;

    fn load_all_clients(&self) -> Result<Vec<ClientRecord>, StoreError>;

    /// Insert or replace the record for `(client_id, file_name)`
    fn save_file(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Update the verified flag, returning whether the file is known
    fn set_file_verified(
        &self,
        client_id: &ClientId,
        file_name: &str,
        verified: bool,
    ) -> Result<bool, StoreError>;

    fn load_file(
        &self,
        client_id: &ClientId,
        file_name: &str,
    ) -> Result<Option<FileRecord>, StoreError>;
}

/// Convert stored Unix seconds back to a timestamp
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
