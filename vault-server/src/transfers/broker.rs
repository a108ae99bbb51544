//! Admission control and eviction for in-flight transfers
//!
//! The broker keeps a byte-count ledger that shadows every transfer's
//! reassembly buffer. It never holds chunk data itself. Entries are ordered
//! by a monotonically increasing recency stamp so the least recently touched
//! transfer is always the first key of `recency`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use strum::AsRefStr;
use tracing::{debug, info, warn};
use vault_common::ClientId;

/// Default maximum number of transfers tracked at once
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 64;

/// Default maximum number of chunks in one transfer (every possible u16 packet)
pub const DEFAULT_MAX_CHUNKS_PER_TRANSFER: usize = u16::MAX as usize;

/// Default maximum ciphertext bytes buffered for one transfer (256MB)
pub const DEFAULT_MAX_BYTES_PER_TRANSFER: u64 = 256 * 1024 * 1024;

/// Default aggregate size that triggers pressure eviction (1GB)
pub const DEFAULT_MEMORY_PRESSURE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Default time without a chunk before a transfer counts as abandoned
pub const DEFAULT_ABANDONED_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default interval between background sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Pressure eviction stops once usage falls below this share of the threshold
const PRESSURE_TARGET_PERCENT: u64 = 80;

/// Limits enforced by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    pub max_concurrent_transfers: usize,
    pub max_chunks_per_transfer: usize,
    pub max_bytes_per_transfer: u64,
    pub memory_pressure_threshold_bytes: u64,
    pub abandoned_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
            max_chunks_per_transfer: DEFAULT_MAX_CHUNKS_PER_TRANSFER,
            max_bytes_per_transfer: DEFAULT_MAX_BYTES_PER_TRANSFER,
            memory_pressure_threshold_bytes: DEFAULT_MEMORY_PRESSURE_THRESHOLD,
            abandoned_timeout: DEFAULT_ABANDONED_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Identifies one transfer: the owning client and the target filename
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferKey {
    pub client_id: ClientId,
    pub filename: String,
}

impl TransferKey {
    pub fn new(client_id: ClientId, filename: &str) -> Self {
        Self {
            client_id,
            filename: filename.to_string(),
        }
    }
}

/// Why a ledger entry was released, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RemovalReason {
    Completed,
    Failed,
    Restarted,
    Evicted,
    Abandoned,
    MemoryPressure,
    Stale,
    ClientExpired,
    Shutdown,
}

/// Counts from one background sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub abandoned: usize,
    pub pressure_evicted: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.abandoned + self.pressure_evicted
    }
}

/// Point-in-time ledger totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub transfers: usize,
    pub bytes: u64,
}

#[derive(Debug)]
struct LedgerEntry {
    total_packets: u16,
    original_size: u32,
    chunk_sizes: BTreeMap<u16, u64>,
    bytes: u64,
    created_at: Instant,
    touched_at: Instant,
    stamp: u64,
}

impl LedgerEntry {
    /// `add_chunk` refuses packet numbers outside `1..=total_packets`
    fn is_complete(&self) -> bool {
        self.chunk_sizes.len() == usize::from(self.total_packets)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    entries: HashMap<TransferKey, LedgerEntry>,
    recency: BTreeMap<u64, TransferKey>,
    next_stamp: u64,
    total_bytes: u64,
    /// Keys removed by the broker itself, waiting for the engine to reap
    evicted: Vec<TransferKey>,
}

impl Ledger {
    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    /// Move an entry to the most-recently-used position
    fn touch(&mut self, key: &TransferKey) {
        let stamp = self.stamp();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.stamp);
            entry.stamp = stamp;
            entry.touched_at = Instant::now();
            self.recency.insert(stamp, key.clone());
        }
    }

    fn remove(&mut self, key: &TransferKey) -> Option<LedgerEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.stamp);
        self.total_bytes -= entry.bytes;
        Some(entry)
    }

    /// Oldest incomplete transfer, if any
    fn oldest_incomplete(&self) -> Option<TransferKey> {
        self.recency
            .values()
            .find(|key| {
                self.entries
                    .get(*key)
                    .is_some_and(|entry| !entry.is_complete())
            })
            .cloned()
    }
}

/// Ledger-based memory broker shared by the registry and the engine
pub struct TransferMemoryBroker {
    config: BrokerConfig,
    ledger: Mutex<Ledger>,
}

impl TransferMemoryBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().expect("transfer broker lock poisoned")
    }

    /// Admit a new transfer with an empty ledger entry
    ///
    /// An existing entry for the same key is replaced. At capacity the oldest
    /// incomplete transfer is evicted first; if every tracked transfer is
    /// complete, admission is refused.
    pub fn create(&self, key: &TransferKey, total_packets: u16, original_size: u32) -> bool {
        let mut ledger = self.lock();
        ledger.remove(key);

        if ledger.entries.len() >= self.config.max_concurrent_transfers
            && !Self::evict_oldest_locked(&mut ledger, RemovalReason::Evicted)
        {
            warn!(
                client = %key.client_id,
                file = key.filename.as_str(),
                tracked = ledger.entries.len(),
                "transfer refused: at capacity with no incomplete transfer to evict"
            );
            return false;
        }

        let now = Instant::now();
        let stamp = ledger.stamp();
        ledger.entries.insert(
            key.clone(),
            LedgerEntry {
                total_packets,
                original_size,
                chunk_sizes: BTreeMap::new(),
                bytes: 0,
                created_at: now,
                touched_at: now,
                stamp,
            },
        );
        ledger.recency.insert(stamp, key.clone());
        debug!(
            client = %key.client_id,
            file = key.filename.as_str(),
            total_packets,
            original_size,
            "transfer admitted"
        );
        true
    }

    /// Account for one chunk, refusing without side effects if it breaks a limit
    ///
    /// A repeated packet number replaces its previous byte count and does not
    /// count against the chunk limit.
    pub fn add_chunk(&self, key: &TransferKey, packet_number: u16, chunk: &[u8]) -> bool {
        let mut ledger = self.lock();
        let Some(entry) = ledger.entries.get_mut(key) else {
            return false;
        };

        if packet_number == 0 || packet_number > entry.total_packets {
            return false;
        }

        let len = chunk.len() as u64;
        let previous = entry.chunk_sizes.get(&packet_number).copied();
        if previous.is_none() && entry.chunk_sizes.len() >= self.config.max_chunks_per_transfer {
            warn!(
                client = %key.client_id,
                file = key.filename.as_str(),
                packet = packet_number,
                "chunk refused: chunk limit reached"
            );
            return false;
        }

        let new_bytes = entry.bytes - previous.unwrap_or(0) + len;
        if new_bytes > self.config.max_bytes_per_transfer {
            warn!(
                client = %key.client_id,
                file = key.filename.as_str(),
                packet = packet_number,
                bytes = new_bytes,
                limit = self.config.max_bytes_per_transfer,
                "chunk refused: transfer byte limit exceeded"
            );
            return false;
        }

        entry.chunk_sizes.insert(packet_number, len);
        let old_bytes = entry.bytes;
        entry.bytes = new_bytes;
        ledger.total_bytes = ledger.total_bytes - old_bytes + new_bytes;
        ledger.touch(key);
        true
    }

    /// Release a transfer's ledger entry; a missing entry is not an error
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, key: &TransferKey, reason: RemovalReason) -> bool {
        let removed = self.lock().remove(key);
        if let Some(entry) = &removed {
            debug!(
                client = %key.client_id,
                file = key.filename.as_str(),
                reason = reason.as_ref(),
                bytes = entry.bytes,
                age_ms = entry.created_at.elapsed().as_millis() as u64,
                "transfer released"
            );
        }
        removed.is_some()
    }

    /// Evict the least recently touched incomplete transfer
    ///
    /// Complete transfers are never evicted. Returns whether anything was evicted.
    pub fn evict_oldest_incomplete(&self) -> bool {
        Self::evict_oldest_locked(&mut self.lock(), RemovalReason::Evicted)
    }

    fn evict_oldest_locked(ledger: &mut Ledger, reason: RemovalReason) -> bool {
        let Some(key) = ledger.oldest_incomplete() else {
            return false;
        };
        if let Some(entry) = ledger.remove(&key) {
            warn!(
                client = %key.client_id,
                file = key.filename.as_str(),
                reason = reason.as_ref(),
                bytes = entry.bytes,
                received = entry.chunk_sizes.len(),
                total_packets = entry.total_packets,
                original_size = entry.original_size,
                "transfer evicted"
            );
        }
        ledger.evicted.push(key);
        true
    }

    /// Drop abandoned transfers, then relieve memory pressure
    ///
    /// A transfer is abandoned when no chunk has arrived within the abandoned
    /// timeout. If the remaining total still exceeds the pressure threshold,
    /// incomplete transfers are evicted oldest first until usage is below 80%
    /// of the threshold or nothing evictable remains.
    pub fn sweep(&self) -> SweepReport {
        let mut ledger = self.lock();
        let mut report = SweepReport::default();
        let now = Instant::now();

        let abandoned: Vec<TransferKey> = ledger
            .entries
            .iter()
            .filter(|(_, entry)| {
                now.saturating_duration_since(entry.touched_at) > self.config.abandoned_timeout
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in abandoned {
            if ledger.remove(&key).is_some() {
                info!(
                    client = %key.client_id,
                    file = key.filename.as_str(),
                    "abandoned transfer released"
                );
                ledger.evicted.push(key);
                report.abandoned += 1;
            }
        }

        let threshold = self.config.memory_pressure_threshold_bytes;
        if ledger.total_bytes > threshold {
            let target = threshold / 100 * PRESSURE_TARGET_PERCENT;
            while ledger.total_bytes >= target
                && Self::evict_oldest_locked(&mut ledger, RemovalReason::MemoryPressure)
            {
                report.pressure_evicted += 1;
            }
        }

        report
    }

    /// Keys removed by eviction or sweeping since the last call
    pub fn drain_evicted(&self) -> Vec<TransferKey> {
        std::mem::take(&mut self.lock().evicted)
    }

    pub fn contains(&self, key: &TransferKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> BrokerStats {
        let ledger = self.lock();
        BrokerStats {
            transfers: ledger.entries.len(),
            bytes: ledger.total_bytes,
        }
    }

    /// Bytes currently recorded for one transfer
    pub fn transfer_bytes(&self, key: &TransferKey) -> Option<u64> {
        self.lock().entries.get(key).map(|entry| entry.bytes)
    }

    /// Drop every entry, used at shutdown
    pub fn clear(&self) {
        let mut ledger = self.lock();
        ledger.entries.clear();
        ledger.recency.clear();
        ledger.evicted.clear();
        ledger.total_bytes = 0;
    }
}
