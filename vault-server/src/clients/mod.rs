//! In-memory client state
//!
//! The registry owns every known client; each client owns its in-flight
//! transfers. Persistence is handled separately by the metadata store.

mod client;
mod registry;
mod transfer;

pub use client::{Client, ClientState};
pub use registry::{ClientRegistry, MaintenanceReport, RegistryConfig};
pub use transfer::TransferState;
