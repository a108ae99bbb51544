//! Registry of known clients
//!
//! One lock guards both indices (`id -> client` and `name -> id`) so
//! uniqueness checks and inserts are atomic together. Per-client state has
//! its own lock, always taken after the index lock when both are needed.

mod maintenance;
mod mutations;
mod queries;

pub use maintenance::MaintenanceReport;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use vault_common::ClientId;

use super::Client;
use crate::transfers::TransferMemoryBroker;

/// Default idle time after which a client is dropped from memory (30 minutes)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default idle time after which a partial transfer is purged (10 minutes)
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default interval between maintenance passes
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Timeouts applied by registry maintenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    pub session_timeout: Duration,
    pub transfer_timeout: Duration,
    pub maintenance_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

#[derive(Default)]
pub(super) struct Index {
    by_id: HashMap<ClientId, Arc<Client>>,
    by_name: HashMap<String, ClientId>,
}

/// All clients currently held in memory
pub struct ClientRegistry {
    index: Mutex<Index>,
    broker: Arc<TransferMemoryBroker>,
    config: RegistryConfig,
}

impl ClientRegistry {
    /// Create an empty registry that releases broker entries through `broker`
    pub fn new(config: RegistryConfig, broker: Arc<TransferMemoryBroker>) -> Self {
        Self {
            index: Mutex::new(Index::default()),
            broker,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Broker that tracks this registry's in-flight transfers
    pub fn broker(&self) -> &Arc<TransferMemoryBroker> {
        &self.broker
    }

    fn lock_index(&self) -> MutexGuard<'_, Index> {
        self.index.lock().expect("client registry lock poisoned")
    }
}
