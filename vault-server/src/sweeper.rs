//! Background maintenance tasks

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::clients::ClientRegistry;
use crate::transfers::TransferEngine;

/// Periodically expire idle clients and purge stale partial transfers
pub fn spawn_registry_maintenance(registry: Arc<ClientRegistry>) -> JoinHandle<()> {
    let period = registry.config().maintenance_interval;
    tokio::spawn(async move {
        let mut ticker = ticker(period);
        loop {
            ticker.tick().await;
            let report = registry.run_maintenance();
            if report.expired_removed > 0 || report.stale_transfers_removed > 0 {
                info!(
                    expired = report.expired_removed,
                    stale_transfers = report.stale_transfers_removed,
                    clients = registry.len(),
                    "registry maintenance"
                );
            }
        }
    })
}

/// Periodically release abandoned transfers and relieve memory pressure
pub fn spawn_broker_sweeper(engine: Arc<TransferEngine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = ticker(period);
        loop {
            ticker.tick().await;
            engine.sweep();
        }
    })
}

/// Interval whose first tick is one period from now
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();
    ticker
}
