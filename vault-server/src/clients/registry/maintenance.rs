//! Periodic cleanup of idle clients and stale transfers

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::ClientRegistry;
use crate::clients::Client;
use crate::transfers::{RemovalReason, TransferKey};

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_removed: usize,
    pub stale_transfers_removed: usize,
}

impl ClientRegistry {
    /// Drop idle clients and purge stale partial transfers
    ///
    /// Clients idle longer than the session timeout are removed from memory
    /// only; the metadata store keeps them. For every remaining client, any
    /// transfer without a packet within the transfer timeout is discarded.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let now = Instant::now();
        let session_timeout = self.config.session_timeout;

        let (expired, remaining): (Vec<Arc<Client>>, Vec<Arc<Client>>) = {
            let mut index = self.lock_index();
            let (expired, remaining): (Vec<_>, Vec<_>) = index
                .by_id
                .values()
                .cloned()
                .partition(|client| client.idle_for(now) > session_timeout);
            for client in &expired {
                index.by_id.remove(&client.id());
                index.by_name.remove(client.name());
            }
            (expired, remaining)
        };

        let mut report = MaintenanceReport {
            expired_removed: expired.len(),
            ..Default::default()
        };

        for client in &expired {
            let released = self.release_transfers(client, RemovalReason::ClientExpired);
            info!(
                client = client.name(),
                transfers = released,
                "idle client dropped from memory"
            );
        }

        for client in &remaining {
            report.stale_transfers_removed += self.purge_stale_transfers(client, now);
        }

        report
    }

    fn purge_stale_transfers(&self, client: &Client, now: Instant) -> usize {
        let timeout = self.config.transfer_timeout;
        let mut state = client.lock_state();
        let stale: Vec<String> = state
            .transfers
            .iter()
            .filter(|(_, transfer)| transfer.is_stale(now, timeout))
            .map(|(filename, _)| filename.clone())
            .collect();

        for filename in &stale {
            let Some(transfer) = state.transfers.remove(filename) else {
                continue;
            };
            self.broker
                .remove(&TransferKey::new(client.id(), filename), RemovalReason::Stale);
            warn!(
                client = client.name(),
                file = filename.as_str(),
                received = transfer.received_count(),
                total_packets = transfer.total_packets(),
                age_secs = now.saturating_duration_since(transfer.created_at()).as_secs(),
                "stale partial transfer discarded"
            );
        }
        stale.len()
    }
}
