//! SQLite metadata store

use std::future::Future;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::runtime::Handle;
use vault_common::ClientId;

use super::{ClientRecord, FileRecord, MetadataStore, StoreError, from_unix, sql};

/// Maximum pooled connections for a file-backed database
const MAX_CONNECTIONS: u32 = 5;

/// Row type for client queries
type ClientRow = (String, String, Option<Vec<u8>>, i64);

/// Row type for file queries
type FileRow = (String, String, String, i64, i64, i64, bool);

fn parse_id(hex: &str) -> Result<ClientId, StoreError> {
    ClientId::from_hex(hex).ok_or_else(|| StoreError::Corrupt(format!("invalid client id '{hex}'")))
}

impl TryFrom<ClientRow> for ClientRecord {
    type Error = StoreError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&row.0)?,
            name: row.1,
            public_key: row.2,
            last_seen: from_unix(row.3),
        })
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            client_id: parse_id(&row.0)?,
            file_name: row.1,
            path: PathBuf::from(row.2),
            size: u64::try_from(row.3)
                .map_err(|_| StoreError::Corrupt(format!("negative size {}", row.3)))?,
            modified_at: from_unix(row.4),
            crc32: u32::try_from(row.5)
                .map_err(|_| StoreError::Corrupt(format!("crc32 out of range {}", row.5)))?,
            verified: row.6,
        })
    }
}

/// Metadata store backed by a sqlx SQLite pool
///
/// The trait is synchronous, so every call blocks on the runtime the store
/// was opened in. Call it from `spawn_blocking` or from a non-runtime thread.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    handle: Handle,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or a migration fails.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Open a private in-memory database, mainly for tests
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        // Every connection to :memory: is a separate database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            handle: Handle::current(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

impl MetadataStore for SqliteStore {
    fn save_client(&self, record: &ClientRecord) -> Result<(), StoreError> {
        self.block_on(
            sqlx::query(sql::SQL_UPSERT_CLIENT)
                .bind(record.id.to_hex())
                .bind(&record.name)
                .bind(record.public_key.as_deref())
                .bind(record.last_seen.timestamp())
                .execute(&self.pool),
        )?;
        Ok(())
    }

    fn load_client(&self, id: &ClientId) -> Result<Option<ClientRecord>, StoreError> {
        let row: Option<ClientRow> = self.block_on(
            sqlx::query_as(sql::SQL_SELECT_CLIENT_BY_ID)
                .bind(id.to_hex())
                .fetch_optional(&self.pool),
        )?;
        row.map(ClientRecord::try_from).transpose()
    }

    fn load_client_by_name(&self, name: &str) -> Result<Option<ClientRecord>, StoreError> {
        let row: Option<ClientRow> = self.block_on(
            sqlx::query_as(sql::SQL_SELECT_CLIENT_BY_NAME)
                .bind(name)
                .fetch_optional(&self.pool),
        )?;
        row.map(ClientRecord::try_from).transpose()
    }

    fn load_all_clients(&self) -> Result<Vec<ClientRecord>, StoreError> {
        let rows: Vec<ClientRow> =
            self.block_on(sqlx::query_as(sql::SQL_SELECT_ALL_CLIENTS).fetch_all(&self.pool))?;
        rows.into_iter().map(ClientRecord::try_from).collect()
    }

    fn save_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        let size = i64::try_from(record.size)
            .map_err(|_| StoreError::Corrupt(format!("file size {} too large", record.size)))?;
        self.block_on(
            sqlx::query(sql::SQL_UPSERT_FILE)
                .bind(record.client_id.to_hex())
                .bind(&record.file_name)
                .bind(record.path.to_string_lossy().into_owned())
                .bind(size)
                .bind(record.modified_at.timestamp())
                .bind(i64::from(record.crc32))
                .bind(record.verified)
                .execute(&self.pool),
        )?;
        Ok(())
    }

    fn set_file_verified(
        &self,
        client_id: &ClientId,
        file_name: &str,
        verified: bool,
    ) -> Result<bool, StoreError> {
        let result = self.block_on(
            sqlx::query(sql::SQL_SET_FILE_VERIFIED)
                .bind(verified)
                .bind(client_id.to_hex())
                .bind(file_name)
                .execute(&self.pool),
        )?;
        Ok(result.rows_affected() > 0)
    }

    fn load_file(
        &self,
        client_id: &ClientId,
        file_name: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let row: Option<FileRow> = self.block_on(
            sqlx::query_as(sql::SQL_SELECT_FILE)
                .bind(client_id.to_hex())
                .bind(file_name)
                .fetch_optional(&self.pool),
        )?;
        row.map(FileRecord::try_from).transpose()
    }
}
