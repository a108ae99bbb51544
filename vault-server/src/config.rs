//! Server configuration assembled from command-line arguments

use std::path::PathBuf;
use std::time::Duration;

use vault_common::framing::{DEFAULT_FRAME_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_PAYLOAD_SIZE};

use crate::args::Args;
use crate::clients::RegistryConfig;
use crate::constants::{DATA_DIR_NAME, DATABASE_FILE_NAME, ERR_NO_DATA_DIR, STORAGE_DIR_NAME};
use crate::transfers::BrokerConfig;

/// Get the platform-specific default database path
///
/// # Errors
///
/// Returns an error if the platform has no data directory.
pub fn default_database_path() -> Result<PathBuf, String> {
    let data_dir = dirs::data_dir().ok_or_else(|| ERR_NO_DATA_DIR.to_string())?;
    Ok(data_dir.join(DATA_DIR_NAME).join(DATABASE_FILE_NAME))
}

/// Get the platform-specific default backup storage directory
///
/// # Errors
///
/// Returns an error if the platform has no data directory.
pub fn default_storage_root() -> Result<PathBuf, String> {
    let data_dir = dirs::data_dir().ok_or_else(|| ERR_NO_DATA_DIR.to_string())?;
    Ok(data_dir.join(DATA_DIR_NAME).join(STORAGE_DIR_NAME))
}

/// Everything the core and the connection loop are configured with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub registry: RegistryConfig,
    pub broker: BrokerConfig,
    pub storage_root: PathBuf,
    pub max_payload_size: u32,
    pub idle_timeout: Duration,
    pub frame_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            broker: BrokerConfig::default(),
            storage_root: PathBuf::from(STORAGE_DIR_NAME),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Apply command-line overrides on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns an error if no storage root was given and the platform default
    /// cannot be determined.
    pub fn from_args(args: &Args) -> Result<Self, String> {
        let mut config = Self {
            storage_root: match &args.storage {
                Some(path) => path.clone(),
                None => default_storage_root()?,
            },
            ..Self::default()
        };

        if let Some(n) = args.max_transfers {
            config.broker.max_concurrent_transfers = n;
        }
        if let Some(bytes) = args.max_transfer_bytes {
            config.broker.max_bytes_per_transfer = bytes;
        }
        if let Some(bytes) = args.memory_threshold {
            config.broker.memory_pressure_threshold_bytes = bytes;
        }
        if let Some(secs) = args.session_timeout_secs {
            config.registry.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = args.transfer_timeout_secs {
            let timeout = Duration::from_secs(secs);
            config.registry.transfer_timeout = timeout;
            config.broker.abandoned_timeout = timeout;
        }
        if let Some(size) = args.max_payload {
            config.max_payload_size = size;
        }
        Ok(config)
    }
}
