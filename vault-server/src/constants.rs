//! User-facing strings for the vaultd binary

// =============================================================================
// Startup
// =============================================================================

pub const MSG_BANNER: &str = "vaultd encrypted backup server v";
pub const MSG_DATABASE: &str = "Database: ";
pub const MSG_MEMORY_STORE: &str = "Metadata store: in-memory (nothing is persisted)";
pub const MSG_STORAGE: &str = "Backup storage: ";
pub const MSG_LISTENING: &str = "Listening on ";
pub const MSG_CLIENTS_LOADED: &str = "Loaded persisted clients: ";

// =============================================================================
// Shutdown
// =============================================================================

pub const MSG_SHUTDOWN_RECEIVED: &str = "Shutdown signal received, stopping";
pub const MSG_SHUTDOWN_COMPLETE: &str = "Shutdown complete";

// =============================================================================
// Fatal Errors
// =============================================================================

pub const ERR_GENERIC: &str = "Error: ";
pub const ERR_DATABASE_INIT: &str = "Failed to initialize database: ";
pub const ERR_STORAGE_INIT: &str = "Failed to create backup storage directory: ";
pub const ERR_LOAD_CLIENTS: &str = "Failed to load persisted clients: ";
pub const ERR_BIND_FAILED: &str = "Failed to bind ";
pub const ERR_NO_DATA_DIR: &str = "Unable to determine a data directory for this platform";

// =============================================================================
// Runtime Errors
// =============================================================================

pub const ERR_ACCEPT: &str = "Failed to accept connection: ";
pub const ERR_SIGNAL_SIGTERM: &str = "Failed to install SIGTERM handler";
pub const ERR_SIGNAL_SIGINT: &str = "Failed to install SIGINT handler";
pub const ERR_SIGNAL_CTRLC: &str = "Failed to listen for Ctrl+C";

// =============================================================================
// Paths
// =============================================================================

/// Directory under the platform data directory that holds all server state
pub const DATA_DIR_NAME: &str = "vaultd";

/// Database file name inside [`DATA_DIR_NAME`]
pub const DATABASE_FILE_NAME: &str = "vault.db";

/// Backup storage directory name inside [`DATA_DIR_NAME`]
pub const STORAGE_DIR_NAME: &str = "backups";
