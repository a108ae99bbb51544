//! File reassembly state machine
//!
//! Per `(client, filename)`: absent -> collecting -> complete -> stored or
//! aborted. Packet 1 always (re)starts a transfer. Every exit from
//! `collecting` goes through [`TransferEngine::abort`] or the completion
//! guard, which release the broker entry together with the in-memory state.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use vault_common::validators::validate_filename;
use vault_common::wire::SendFileRequest;

use super::broker::{RemovalReason, SweepReport, TransferKey, TransferMemoryBroker};
use super::locks::TransferLocks;
use super::storage::FileStorage;
use crate::clients::{Client, ClientRegistry, ClientState, TransferState};
use crate::crypto::{self, SessionKey};
use crate::db::{FileRecord, MetadataStore};
use crate::error::CoreError;

/// Result of feeding one packet to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutcome {
    /// More packets are needed; nothing is sent back
    Pending { received: usize, total_packets: u16 },
    /// The final packet arrived and the file is on disk
    Stored(StoredFile),
}

/// A file that was decrypted, written and recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    /// Total ciphertext bytes across all packets
    pub encrypted_size: u32,
    pub crc32: u32,
}

/// Releases the broker entry of a completed transfer on every exit path
struct CompletionGuard<'a> {
    broker: &'a TransferMemoryBroker,
    key: &'a TransferKey,
    reason: RemovalReason,
}

impl<'a> CompletionGuard<'a> {
    fn new(broker: &'a TransferMemoryBroker, key: &'a TransferKey) -> Self {
        Self {
            broker,
            key,
            reason: RemovalReason::Failed,
        }
    }

    fn succeed(&mut self) {
        self.reason = RemovalReason::Completed;
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.broker.remove(self.key, self.reason);
    }
}

/// What the locked phase of packet handling decided
enum Accepted {
    Pending { received: usize, total_packets: u16 },
    Complete(TransferState, SessionKey),
}

/// Drives reassembly for all clients
pub struct TransferEngine {
    registry: Arc<ClientRegistry>,
    locks: TransferLocks,
    storage: FileStorage,
    store: Arc<dyn MetadataStore>,
}

impl TransferEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        storage: FileStorage,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            registry,
            locks: TransferLocks::new(),
            storage,
            store,
        }
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    fn broker(&self) -> &TransferMemoryBroker {
        self.registry.broker()
    }

    /// Handle one SendFile packet for `client`
    ///
    /// Returns [`PacketOutcome::Stored`] once the last missing packet arrives
    /// and the file has been decrypted, written and recorded.
    ///
    /// # Errors
    ///
    /// - `Protocol`: invalid filename, no session key, bad packet numbering,
    ///   metadata that disagrees with packet 1, or a packet without a transfer
    /// - `Resource`: the broker refused the transfer or the chunk
    /// - `Content`: decryption failed or the plaintext size is wrong
    /// - `Storage`: the file or its metadata could not be written
    ///
    /// Any error after packet validation releases the transfer entirely.
    pub fn handle_packet(
        &self,
        client: &Client,
        packet: SendFileRequest,
    ) -> Result<PacketOutcome, CoreError> {
        validate_filename(&packet.filename)?;
        if client.session_key().is_none() {
            return Err(CoreError::protocol(
                "no session key: submit a public key or reconnect first",
            ));
        }

        let key = TransferKey::new(client.id(), &packet.filename);
        let result = {
            let _pair = self.locks.acquire(&key);
            match self.accept(client, &key, packet) {
                Ok(Accepted::Pending {
                    received,
                    total_packets,
                }) => Ok(PacketOutcome::Pending {
                    received,
                    total_packets,
                }),
                Ok(Accepted::Complete(transfer, session_key)) => self
                    .store_file(client, &key, transfer, &session_key)
                    .map(PacketOutcome::Stored),
                Err(e) => Err(e),
            }
        };

        self.reap_evicted();
        result
    }

    /// Apply a packet to the in-memory state under the pair lock
    fn accept(
        &self,
        client: &Client,
        key: &TransferKey,
        packet: SendFileRequest,
    ) -> Result<Accepted, CoreError> {
        let SendFileRequest {
            original_size,
            packet_number,
            total_packets,
            filename,
            content,
            ..
        } = packet;
        let mut state = client.lock_state();

        if total_packets == 0 || packet_number == 0 || packet_number > total_packets {
            self.abort(&mut state, key, RemovalReason::Failed);
            return Err(CoreError::protocol(format!(
                "packet {packet_number} of {total_packets} is out of range"
            )));
        }

        if packet_number == 1 {
            if state.transfers.remove(&filename).is_some() {
                self.broker().remove(key, RemovalReason::Restarted);
                warn!(
                    client = client.name(),
                    file = filename.as_str(),
                    total_packets,
                    "transfer restarted"
                );
            }
            if !self.broker().create(key, total_packets, original_size) {
                return Err(CoreError::resource("too many concurrent transfers"));
            }
            state
                .transfers
                .insert(filename.clone(), TransferState::new(total_packets, original_size));
        }

        let Some(transfer) = state.transfers.get(&filename) else {
            return Err(CoreError::protocol(format!(
                "packet {packet_number} without an active transfer"
            )));
        };

        if !transfer.matches(total_packets, original_size) {
            let expected = (transfer.total_packets(), transfer.original_size());
            self.abort(&mut state, key, RemovalReason::Failed);
            return Err(CoreError::protocol(format!(
                "packet metadata ({total_packets} packets, {original_size} bytes) \
                 disagrees with transfer ({} packets, {} bytes)",
                expected.0, expected.1
            )));
        }

        if !self.broker().add_chunk(key, packet_number, &content) {
            self.abort(&mut state, key, RemovalReason::Failed);
            return Err(CoreError::resource(format!(
                "chunk {packet_number} exceeds transfer memory limits"
            )));
        }

        let transfer = state
            .transfers
            .get_mut(&filename)
            .ok_or_else(|| CoreError::invariant("transfer vanished while locked"))?;
        if transfer.insert_chunk(packet_number, content) {
            warn!(
                client = client.name(),
                file = filename.as_str(),
                packet = packet_number,
                "duplicate packet overwritten"
            );
        }

        if !transfer.is_complete() {
            let received = transfer.received_count();
            debug!(
                client = client.name(),
                file = filename.as_str(),
                packet = packet_number,
                received,
                total_packets,
                "packet buffered"
            );
            return Ok(Accepted::Pending {
                received,
                total_packets,
            });
        }

        let transfer = state
            .transfers
            .remove(&filename)
            .ok_or_else(|| CoreError::invariant("completed transfer missing"))?;
        match state.session_key.clone() {
            Some(session_key) => Ok(Accepted::Complete(transfer, session_key)),
            None => {
                self.broker().remove(key, RemovalReason::Failed);
                Err(CoreError::invariant("session key cleared during transfer"))
            }
        }
    }

    /// Discard a transfer's state and broker entry
    fn abort(&self, state: &mut ClientState, key: &TransferKey, reason: RemovalReason) {
        state.transfers.remove(&key.filename);
        self.broker().remove(key, reason);
    }

    /// Decrypt, verify, write and record a completed transfer
    fn store_file(
        &self,
        client: &Client,
        key: &TransferKey,
        transfer: TransferState,
        session_key: &SessionKey,
    ) -> Result<StoredFile, CoreError> {
        let mut guard = CompletionGuard::new(self.broker(), key);
        let original_size = transfer.original_size();
        let ciphertext = transfer.reassemble();
        let encrypted_size = u32::try_from(ciphertext.len())
            .map_err(|_| CoreError::resource("reassembled file exceeds 4GB"))?;

        let plaintext = crypto::decrypt_file(session_key, &ciphertext)?;
        if plaintext.len() != original_size as usize {
            return Err(CoreError::content(format!(
                "decrypted {} bytes but {} were declared",
                plaintext.len(),
                original_size
            )));
        }

        let written = self
            .storage
            .write_atomic(&client.id(), &key.filename, &plaintext)?;

        let record = FileRecord {
            client_id: client.id(),
            file_name: key.filename.clone(),
            path: written.path.clone(),
            size: written.size,
            modified_at: Utc::now(),
            crc32: written.crc32,
            verified: false,
        };
        if let Err(e) = self.store.save_file(&record) {
            if let Err(cleanup) = self.storage.delete(&client.id(), &key.filename) {
                warn!(
                    client = client.name(),
                    file = key.filename.as_str(),
                    error = %cleanup,
                    "failed to remove file after metadata error"
                );
            }
            return Err(e.into());
        }

        guard.succeed();
        info!(
            client = client.name(),
            file = key.filename.as_str(),
            size = written.size,
            crc = written.crc32,
            "file stored"
        );
        Ok(StoredFile {
            filename: key.filename.clone(),
            path: written.path,
            size: written.size,
            encrypted_size,
            crc32: written.crc32,
        })
    }

    /// Drop in-memory state for transfers the broker evicted on its own
    ///
    /// A transfer restarted since its eviction has a fresh broker entry and
    /// is left alone.
    pub fn reap_evicted(&self) -> usize {
        let mut reaped = 0;
        for key in self.broker().drain_evicted() {
            let Some(client) = self.registry.get(&key.client_id) else {
                continue;
            };
            let mut state = client.lock_state();
            if !self.broker().contains(&key) && state.transfers.remove(&key.filename).is_some() {
                reaped += 1;
                debug!(
                    client = client.name(),
                    file = key.filename.as_str(),
                    "evicted transfer state dropped"
                );
            }
        }
        reaped
    }

    /// Run the broker sweep and drop the state it released
    pub fn sweep(&self) -> SweepReport {
        let report = self.broker().sweep();
        if report.total() > 0 {
            let reaped = self.reap_evicted();
            info!(
                abandoned = report.abandoned,
                pressure_evicted = report.pressure_evicted,
                reaped,
                "transfer sweep released transfers"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::RegistryConfig;
    use crate::db::MemoryStore;
    use crate::transfers::BrokerConfig;
    use std::fs;
    use tempfile::TempDir;
    use vault_common::ClientId;
    use vault_common::checksum::crc32;

    struct Fixture {
        _temp: TempDir,
        engine: TransferEngine,
        registry: Arc<ClientRegistry>,
        store: Arc<MemoryStore>,
        client: Arc<Client>,
        key: SessionKey,
    }

    fn fixture(config: BrokerConfig) -> Fixture {
        let temp = TempDir::new().unwrap();
        let broker = Arc::new(TransferMemoryBroker::new(config));
        let registry = Arc::new(ClientRegistry::new(RegistryConfig::default(), broker));
        let store = Arc::new(MemoryStore::new());
        let engine = TransferEngine::new(
            Arc::clone(&registry),
            FileStorage::new(temp.path()),
            Arc::clone(&store) as Arc<dyn MetadataStore>,
        );
        let client = registry
            .register(ClientId::from_bytes([7; 16]), "alice", None)
            .unwrap();
        let key = SessionKey::from_bytes([42; 32]);
        client.replace_session_key(key.clone());
        Fixture {
            _temp: temp,
            engine,
            registry,
            store,
            client,
            key,
        }
    }

    /// Encrypt `plaintext` and split the ciphertext into `count` packets
    fn packets(key: &SessionKey, name: &str, plaintext: &[u8], count: usize) -> Vec<SendFileRequest> {
        let ciphertext = crypto::encrypt_file(key, plaintext).unwrap();
        let size = ciphertext.len().div_ceil(count);
        ciphertext
            .chunks(size)
            .enumerate()
            .map(|(i, chunk)| SendFileRequest {
                encrypted_size: chunk.len() as u32,
                original_size: plaintext.len() as u32,
                packet_number: i as u16 + 1,
                total_packets: count as u16,
                filename: name.to_string(),
                content: chunk.to_vec(),
            })
            .collect()
    }

    fn tmp_files(dir: &std::path::Path) -> usize {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let f = fixture(BrokerConfig::default());
        let plaintext: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
        let sent = packets(&f.key, "data.bin", &plaintext, 4);
        assert_eq!(sent.len(), 4);

        let mut outcome = None;
        // Packet 1 opens the transfer, the rest arrive shuffled
        for i in [0, 3, 1, 2] {
            outcome = Some(f.engine.handle_packet(&f.client, sent[i].clone()).unwrap());
        }
        let PacketOutcome::Stored(stored) = outcome.unwrap() else {
            panic!("final packet should store the file");
        };
        assert_eq!(stored.crc32, crc32(&plaintext));
        assert_eq!(fs::read(&stored.path).unwrap(), plaintext);
        assert_eq!(stored.size, plaintext.len() as u64);

        let record = f.store.load_file(&f.client.id(), "data.bin").unwrap().unwrap();
        assert_eq!(record.crc32, stored.crc32);
        assert!(!record.verified);
        assert!(!f.client.has_transfer("data.bin"));
        assert_eq!(f.registry.broker().stats().transfers, 0);
    }

    #[test]
    fn test_missing_packet_never_completes() {
        let f = fixture(BrokerConfig::default());
        let sent = packets(&f.key, "gap.bin", &[9u8; 100], 3);
        for packet in [sent[0].clone(), sent[2].clone(), sent[2].clone()] {
            let outcome = f.engine.handle_packet(&f.client, packet).unwrap();
            assert!(matches!(outcome, PacketOutcome::Pending { .. }));
        }
        let outcome = f.engine.handle_packet(&f.client, sent[1].clone()).unwrap();
        assert!(matches!(outcome, PacketOutcome::Stored(_)));
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let f = fixture(BrokerConfig::default());
        let sent = packets(&f.key, "dup.bin", &[1u8; 64], 3);
        let key = TransferKey::new(f.client.id(), "dup.bin");
        f.engine.handle_packet(&f.client, sent[0].clone()).unwrap();
        f.engine.handle_packet(&f.client, sent[1].clone()).unwrap();
        let bytes = f.registry.broker().transfer_bytes(&key);

        let outcome = f.engine.handle_packet(&f.client, sent[1].clone()).unwrap();
        assert_eq!(
            outcome,
            PacketOutcome::Pending {
                received: 2,
                total_packets: 3
            }
        );
        assert_eq!(f.registry.broker().transfer_bytes(&key), bytes);

        let outcome = f.engine.handle_packet(&f.client, sent[2].clone()).unwrap();
        assert!(matches!(outcome, PacketOutcome::Stored(_)));
    }

    #[test]
    fn test_restart_replaces_metadata() {
        let f = fixture(BrokerConfig::default());
        let first = packets(&f.key, "x.bin", &[5u8; 200], 3);
        f.engine.handle_packet(&f.client, first[0].clone()).unwrap();
        f.engine.handle_packet(&f.client, first[1].clone()).unwrap();

        let second = packets(&f.key, "x.bin", &[6u8; 200], 2);
        let outcome = f.engine.handle_packet(&f.client, second[0].clone()).unwrap();
        assert_eq!(
            outcome,
            PacketOutcome::Pending {
                received: 1,
                total_packets: 2
            }
        );
        // A straggler from the old transfer is rejected as inconsistent
        assert!(matches!(
            f.engine.handle_packet(&f.client, first[2].clone()),
            Err(CoreError::Protocol(_))
        ));
        assert!(!f.client.has_transfer("x.bin"));
    }

    #[test]
    fn test_decrypt_failure_cleans_up() {
        let f = fixture(BrokerConfig::default());
        let wrong = SessionKey::from_bytes([1; 32]);
        let sent = packets(&wrong, "bad.bin", &[3u8; 40], 2);
        f.engine.handle_packet(&f.client, sent[0].clone()).unwrap();
        let result = f.engine.handle_packet(&f.client, sent[1].clone());

        // A wrong key either breaks the padding or yields the wrong length
        assert!(matches!(result, Err(CoreError::Content(_))));
        assert_eq!(f.registry.broker().stats().transfers, 0);
        assert!(!f.client.has_transfer("bad.bin"));
        let dir = f.engine.storage().client_dir(&f.client.id());
        assert_eq!(tmp_files(&dir), 0);
        assert!(!dir.join("bad.bin").exists());
    }

    #[test]
    fn test_size_mismatch_is_content_error() {
        let f = fixture(BrokerConfig::default());
        let mut sent = packets(&f.key, "short.bin", &[3u8; 40], 1);
        sent[0].original_size = 41;
        assert!(matches!(
            f.engine.handle_packet(&f.client, sent.remove(0)),
            Err(CoreError::Content(_))
        ));
    }

    #[test]
    fn test_invalid_filename_creates_no_state() {
        let f = fixture(BrokerConfig::default());
        for name in ["../etc/passwd", "CON", "file;rm.txt"] {
            let mut sent = packets(&f.key, "ok.bin", &[1u8; 10], 1);
            sent[0].filename = name.to_string();
            assert!(matches!(
                f.engine.handle_packet(&f.client, sent.remove(0)),
                Err(CoreError::Protocol(_))
            ));
        }
        assert_eq!(f.registry.broker().stats().transfers, 0);
        assert_eq!(f.client.transfer_count(), 0);
    }

    #[test]
    fn test_requires_session_key() {
        let f = fixture(BrokerConfig::default());
        let other = f
            .registry
            .register(ClientId::from_bytes([8; 16]), "nokey", None)
            .unwrap();
        let sent = packets(&f.key, "a.bin", &[1u8; 10], 1);
        assert!(matches!(
            f.engine.handle_packet(&other, sent[0].clone()),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_packet_without_transfer() {
        let f = fixture(BrokerConfig::default());
        let sent = packets(&f.key, "late.bin", &[1u8; 100], 2);
        assert!(matches!(
            f.engine.handle_packet(&f.client, sent[1].clone()),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_byte_limit_aborts_transfer() {
        let f = fixture(BrokerConfig {
            max_bytes_per_transfer: 32,
            ..Default::default()
        });
        let sent = packets(&f.key, "big.bin", &[0u8; 100], 2);
        assert!(matches!(
            f.engine.handle_packet(&f.client, sent[0].clone()),
            Err(CoreError::Resource(_))
        ));
        assert!(!f.client.has_transfer("big.bin"));
        assert_eq!(f.registry.broker().stats().transfers, 0);
    }

    #[test]
    fn test_eviction_drops_engine_state() {
        let f = fixture(BrokerConfig {
            max_concurrent_transfers: 1,
            ..Default::default()
        });
        let a = packets(&f.key, "a.bin", &[1u8; 100], 2);
        let b = packets(&f.key, "b.bin", &[2u8; 100], 2);
        f.engine.handle_packet(&f.client, a[0].clone()).unwrap();
        f.engine.handle_packet(&f.client, b[0].clone()).unwrap();

        assert!(!f.client.has_transfer("a.bin"));
        assert!(f.client.has_transfer("b.bin"));
        assert!(matches!(
            f.engine.handle_packet(&f.client, a[1].clone()),
            Err(CoreError::Protocol(_))
        ));
        assert!(matches!(
            f.engine.handle_packet(&f.client, b[1].clone()),
            Ok(PacketOutcome::Stored(_))
        ));
    }
}
