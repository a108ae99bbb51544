//! SQL query constants for the metadata store
//!
//! Each query is documented with its parameters and special behaviors.
//! Client ids are stored as lowercase hex, timestamps as Unix seconds.

// ========================================================================
// Client Query Operations
// ========================================================================

/// Insert a client or update an existing one
///
/// **Parameters:**
/// 1. `id: &str` - Client id (hex)
/// 2. `name: &str` - Client name
/// 3. `public_key: Option<&[u8]>` - Public key field, if submitted
/// 4. `last_seen: i64` - Last activity time
///
/// **Note:** A NULL public key keeps the stored one; keys are never cleared.
pub const SQL_UPSERT_CLIENT: &str = "INSERT INTO clients (id, name, public_key, last_seen) VALUES (?, ?, ?, ?) \
     ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
     public_key = COALESCE(excluded.public_key, clients.public_key), \
     last_seen = excluded.last_seen";

/// Select a client by id
///
/// **Parameters:**
/// 1. `id: &str` - Client id (hex)
///
/// **Returns:** `(id, name, public_key, last_seen)`
pub const SQL_SELECT_CLIENT_BY_ID: &str =
    "SELECT id, name, public_key, last_seen FROM clients WHERE id = ?";

/// Select a client by exact name
///
/// **Parameters:**
/// 1. `name: &str` - Client name (case-sensitive)
///
/// **Returns:** `(id, name, public_key, last_seen)`
pub const SQL_SELECT_CLIENT_BY_NAME: &str =
    "SELECT id, name, public_key, last_seen FROM clients WHERE name = ?";

/// Select every client, used once at startup
///
/// **Parameters:** None
///
/// **Returns:** `(id, name, public_key, last_seen)` ordered by name
pub const SQL_SELECT_ALL_CLIENTS: &str =
    "SELECT id, name, public_key, last_seen FROM clients ORDER BY name";

// ========================================================================
// File Query Operations
// ========================================================================

/// Insert or replace a stored file record
///
/// **Parameters:**
/// 1. `client_id: &str` - Owner id (hex)
/// 2. `file_name: &str` - File name
/// 3. `path: &str` - Absolute or storage-relative path on disk
/// 4. `size: i64` - Plaintext size in bytes
/// 5. `modified_at: i64` - Time the file was written
/// 6. `crc32: i64` - Server-side checksum
/// 7. `verified: bool` - Whether the client confirmed the checksum
pub const SQL_UPSERT_FILE: &str = "INSERT OR REPLACE INTO files \
     (client_id, file_name, path, size, modified_at, crc32, verified) VALUES (?, ?, ?, ?, ?, ?, ?)";

/// Set the verified flag of a file
///
/// **Parameters:**
/// 1. `verified: bool` - New flag value
/// 2. `client_id: &str` - Owner id (hex)
/// 3. `file_name: &str` - File name
///
/// **Note:** Affects zero rows if the file is unknown.
pub const SQL_SET_FILE_VERIFIED: &str =
    "UPDATE files SET verified = ? WHERE client_id = ? AND file_name = ?";

/// Select one file record
///
/// **Parameters:**
/// 1. `client_id: &str` - Owner id (hex)
/// 2. `file_name: &str` - File name
///
/// **Returns:** `(client_id, file_name, path, size, modified_at, crc32, verified)`
pub const SQL_SELECT_FILE: &str = "SELECT client_id, file_name, path, size, modified_at, crc32, verified \
     FROM files WHERE client_id = ? AND file_name = ?";
