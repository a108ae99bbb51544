//! Reassembly state for one multi-packet file

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Chunks received so far for one `(client, filename)` transfer
///
/// Chunk keys are always within `1..=total_packets`; callers validate the
/// packet number before inserting.
#[derive(Debug)]
pub struct TransferState {
    total_packets: u16,
    original_size: u32,
    received_chunks: BTreeMap<u16, Vec<u8>>,
    created_at: Instant,
    last_activity: Instant,
}

impl TransferState {
    pub fn new(total_packets: u16, original_size: u32) -> Self {
        let now = Instant::now();
        Self {
            total_packets,
            original_size,
            received_chunks: BTreeMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn total_packets(&self) -> u16 {
        self.total_packets
    }

    pub fn original_size(&self) -> u32 {
        self.original_size
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Whether a later packet agrees with the metadata recorded at packet 1
    pub fn matches(&self, total_packets: u16, original_size: u32) -> bool {
        self.total_packets == total_packets && self.original_size == original_size
    }

    /// Store a chunk, overwriting any earlier copy of the same packet
    ///
    /// Returns `true` if the packet number had already been received.
    pub fn insert_chunk(&mut self, packet_number: u16, chunk: Vec<u8>) -> bool {
        self.last_activity = Instant::now();
        self.received_chunks.insert(packet_number, chunk).is_some()
    }

    pub fn received_count(&self) -> usize {
        self.received_chunks.len()
    }

    /// Total ciphertext bytes held
    pub fn buffered_bytes(&self) -> usize {
        self.received_chunks.values().map(Vec::len).sum()
    }

    /// True only when every packet number in `1..=total_packets` is present
    ///
    /// Keys are range-checked on insert and duplicates overwrite, so a full
    /// count means no gaps.
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() == usize::from(self.total_packets)
    }

    /// Whether no packet has arrived within `timeout` of `now`
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }

    /// Concatenate the chunks in ascending packet order
    pub fn reassemble(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buffered_bytes());
        for chunk in self.received_chunks.into_values() {
            out.extend_from_slice(&chunk);
        }
        out
    }
}
