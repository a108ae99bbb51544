//! Command-line argument parsing

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use vault_common::DEFAULT_PORT;

/// Get default database path help text for current platform
fn default_database_help() -> String {
    #[cfg(target_os = "linux")]
    return "Database file path (default: ~/.local/share/vaultd/vault.db)".to_string();

    #[cfg(target_os = "macos")]
    return "Database file path (default: ~/Library/Application Support/vaultd/vault.db)"
        .to_string();

    #[cfg(target_os = "windows")]
    return "Database file path (default: %APPDATA%\\vaultd\\vault.db)".to_string();

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "Database file path (overrides platform default)".to_string();
}

/// Get default storage root help text for current platform
fn default_storage_help() -> String {
    #[cfg(target_os = "linux")]
    return "Backup storage directory (default: ~/.local/share/vaultd/backups/)".to_string();

    #[cfg(target_os = "macos")]
    return "Backup storage directory (default: ~/Library/Application Support/vaultd/backups/)"
        .to_string();

    #[cfg(target_os = "windows")]
    return "Backup storage directory (default: %APPDATA%\\vaultd\\backups\\)".to_string();

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "Backup storage directory (overrides platform default)".to_string();
}

/// Vault encrypted backup server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address to bind to (IPv4 or IPv6)
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Database file path (overrides platform default)
    #[arg(short, long, help = default_database_help())]
    pub database: Option<PathBuf>,

    /// Backup storage directory (overrides platform default)
    #[arg(short, long, help = default_storage_help())]
    pub storage: Option<PathBuf>,

    /// Keep metadata in memory only (nothing survives a restart)
    #[arg(long, default_value = "false", conflicts_with = "database")]
    pub memory: bool,

    /// Enable debug logging (per-packet progress)
    #[arg(long, default_value = "false")]
    pub debug: bool,

    /// Maximum number of transfers buffered at once
    #[arg(long)]
    pub max_transfers: Option<usize>,

    /// Maximum ciphertext bytes buffered for one transfer
    #[arg(long)]
    pub max_transfer_bytes: Option<u64>,

    /// Total buffered bytes above which the oldest transfers are evicted
    #[arg(long)]
    pub memory_threshold: Option<u64>,

    /// Seconds of inactivity before a client is dropped from memory
    #[arg(long)]
    pub session_timeout_secs: Option<u64>,

    /// Seconds without a packet before a partial transfer is discarded
    #[arg(long)]
    pub transfer_timeout_secs: Option<u64>,

    /// Largest request payload accepted, in bytes
    #[arg(long)]
    pub max_payload: Option<u32>,
}
