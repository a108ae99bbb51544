//! Multi-packet file transfers
//!
//! The broker bounds memory across all transfers, the engine drives the
//! per-file reassembly state machine, the lock table serializes packets for
//! the same `(client, filename)` pair, and storage writes finished files to
//! disk atomically.

mod broker;
mod engine;
mod locks;
mod storage;

pub use broker::{
    BrokerConfig, BrokerStats, RemovalReason, SweepReport, TransferKey, TransferMemoryBroker,
};
pub use engine::{PacketOutcome, StoredFile, TransferEngine};
pub use locks::TransferLocks;
pub use storage::{FileStorage, WrittenFile};
