//! End-to-end tests for the request dispatcher
//!
//! These drive the full handshake and file transfer flow through
//! `RequestDispatcher::dispatch` with a real RSA key pair, AES-CBC encrypted
//! packets, an in-memory metadata store and temp-dir storage.

mod common;

use std::fs;

use common::{Harness, packets, unwrap_session_key};
use vault_common::checksum::crc32;
use vault_common::protocol::CLIENT_ID_SIZE;
use vault_common::wire::{FileChecksumResponse, Response, SendFileRequest};
use vault_common::{ClientId, RequestCode, ResponseCode};
use vault_server::crypto::SessionKey;
use vault_server::db::MetadataStore;
use vault_server::transfers::{BrokerConfig, TransferKey};

// ============================================================================
// Helper Functions
// ============================================================================

/// Deterministic, non-repeating test content
fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Every file in a client's storage directory, temp files included
fn stored_files(harness: &Harness, id: ClientId) -> Vec<String> {
    let dir = harness.engine.storage().client_dir(&id);
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

// ============================================================================
// Handshake
// ============================================================================

#[test]
fn test_handshake_issues_usable_session_key() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");

    let client = harness.registry.get(&id).unwrap();
    assert_eq!(client.session_key().unwrap().as_bytes(), key.as_bytes());

    let record = harness.store.load_client(&id).unwrap().unwrap();
    assert_eq!(record.name, "alice");
    assert!(record.public_key.is_some());
}

#[test]
fn test_name_conflict_scenario() {
    let harness = Harness::new();
    let a = ClientId::from_bytes([0xa; 16]);
    let b = ClientId::from_bytes([0xb; 16]);

    let first = harness.register_as(a, "bob");
    assert_eq!(first.code, ResponseCode::RegisterSuccess);
    let issued = ClientId::from_slice(&first.payload).unwrap();

    assert_eq!(harness.register_as(b, "bob"), Response::register_failed());

    // The owner repeating its registration gets the same identity back
    let again = harness.register_as(issued, "bob");
    assert_eq!(again, Response::register_success(&issued));
    assert_eq!(harness.registry.len(), 1);
}

#[test]
fn test_public_key_name_mismatch_is_general_error() {
    let harness = Harness::new();
    let id = harness.register("alice");
    harness.register("bob");

    let payload = vault_common::wire::PublicKeyRequest {
        name: "bob".to_string(),
        public_key: common::public_key_field(),
    }
    .encode()
    .unwrap();
    let response = harness
        .send(id, RequestCode::SubmitPublicKey, payload)
        .unwrap();
    assert_eq!(response, Response::general_error());
    assert!(harness.registry.get(&id).unwrap().session_key().is_none());
}

#[test]
fn test_reconnect_rotates_key() {
    let harness = Harness::new();
    let (id, first) = harness.handshake("alice");

    let response = harness.reconnect(id, "alice");
    assert_eq!(response.code, ResponseCode::ReconnectSuccess);
    assert_eq!(&response.payload[..CLIENT_ID_SIZE], id.as_bytes());
    let second = unwrap_session_key(&response);
    assert_ne!(first.as_bytes(), second.as_bytes());

    let denied = harness.reconnect(id, "mallory");
    assert_eq!(denied, Response::reconnect_denied(&id));
}

#[test]
fn test_reconnect_after_expiry_uses_stored_key() {
    let harness = Harness::new();
    let (id, _) = harness.handshake("alice");
    harness.registry.remove(&id);
    assert!(harness.registry.is_empty());

    let response = harness.reconnect(id, "alice");
    assert_eq!(response.code, ResponseCode::ReconnectSuccess);
    let key = unwrap_session_key(&response);

    // The rehydrated client can transfer immediately
    let plaintext = content(100);
    let mut last = None;
    for packet in packets(&key, "after.bin", &plaintext, 2) {
        last = harness.send_packet(id, packet);
    }
    assert_eq!(last.unwrap().code, ResponseCode::FileChecksum);
}

#[test]
fn test_reconnect_without_key_is_denied() {
    let harness = Harness::new();
    let id = harness.register("alice");
    assert_eq!(harness.reconnect(id, "alice"), Response::reconnect_denied(&id));
}

// ============================================================================
// Transfers
// ============================================================================

#[test]
fn test_out_of_order_transfer_round_trip() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");
    let plaintext = content(5000);
    let packets = packets(&key, "report_2024.pdf", &plaintext, 5);
    let encrypted_size: u32 = packets.iter().map(|p| p.encrypted_size).sum();

    // Packet 1 opens the transfer; the rest may arrive in any order
    let mut responses = Vec::new();
    for index in [0, 4, 2, 3, 1] {
        responses.push(harness.send_packet(id, packets[index].clone()));
    }
    assert!(responses[..4].iter().all(Option::is_none));

    let response = responses[4].clone().unwrap();
    assert_eq!(response.code, ResponseCode::FileChecksum);
    let checksum = FileChecksumResponse::decode(&response.payload).unwrap();
    assert_eq!(checksum.client_id, id);
    assert_eq!(checksum.filename, "report_2024.pdf");
    assert_eq!(checksum.encrypted_size, encrypted_size);
    assert_eq!(checksum.crc32, crc32(&plaintext));

    let path = harness.engine.storage().file_path(&id, "report_2024.pdf");
    assert_eq!(fs::read(path).unwrap(), plaintext);
    assert_eq!(harness.broker.stats().transfers, 0);
    assert!(!harness.registry.get(&id).unwrap().has_transfer("report_2024.pdf"));
}

#[test]
fn test_crc_ok_then_verified() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");
    for packet in packets(&key, "a.txt", b"some text", 1) {
        harness.send_packet(id, packet);
    }
    assert!(!harness.store.load_file(&id, "a.txt").unwrap().unwrap().verified);

    let ack = harness.crc_report(id, RequestCode::CrcOk, "a.txt").unwrap();
    assert_eq!(ack, Response::acknowledge(&id));
    assert!(harness.store.load_file(&id, "a.txt").unwrap().unwrap().verified);
}

#[test]
fn test_crc_retry_then_resend() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");
    for packet in packets(&key, "a.txt", b"first try", 1) {
        harness.send_packet(id, packet);
    }

    assert!(harness.crc_report(id, RequestCode::CrcInvalidRetry, "a.txt").is_none());
    assert!(harness.engine.storage().file_path(&id, "a.txt").exists());

    let mut last = None;
    for packet in packets(&key, "a.txt", b"second try", 2) {
        last = harness.send_packet(id, packet);
    }
    let checksum = FileChecksumResponse::decode(&last.unwrap().payload).unwrap();
    assert_eq!(checksum.crc32, crc32(b"second try"));
    assert_eq!(
        fs::read(harness.engine.storage().file_path(&id, "a.txt")).unwrap(),
        b"second try"
    );
}

#[test]
fn test_crc_abort_deletes_file() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");
    for packet in packets(&key, "a.txt", b"doomed", 1) {
        harness.send_packet(id, packet);
    }

    let ack = harness.crc_report(id, RequestCode::CrcFailedAbort, "a.txt").unwrap();
    assert_eq!(ack.code, ResponseCode::Acknowledge);
    assert!(stored_files(&harness, id).is_empty());
    assert!(!harness.store.load_file(&id, "a.txt").unwrap().unwrap().verified);
}

#[test]
fn test_restart_scenario() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");

    let old = packets(&key, "x.bin", &content(3000), 3);
    assert!(harness.send_packet(id, old[0].clone()).is_none());
    assert!(harness.send_packet(id, old[1].clone()).is_none());

    // Packet 1 again with different metadata discards the first transfer
    let fresh = packets(&key, "x.bin", &content(1000), 2);
    assert!(harness.send_packet(id, fresh[0].clone()).is_none());
    let transfer = TransferKey::new(id, "x.bin");
    assert_eq!(
        harness.broker.transfer_bytes(&transfer),
        Some(u64::from(fresh[0].encrypted_size))
    );

    let done = harness.send_packet(id, fresh[1].clone()).unwrap();
    let checksum = FileChecksumResponse::decode(&done.payload).unwrap();
    assert_eq!(checksum.crc32, crc32(&content(1000)));
}

#[test]
fn test_decrypt_failure_cleans_up() {
    let harness = Harness::new();
    let (id, _) = harness.handshake("alice");
    let wrong = SessionKey::from_bytes([0x33; 32]);

    let packets = packets(&wrong, "secret.bin", &content(200), 3);
    for packet in &packets[..2] {
        assert!(harness.send_packet(id, packet.clone()).is_none());
    }
    let response = harness.send_packet(id, packets[2].clone()).unwrap();
    assert_eq!(response, Response::general_error());

    assert!(!harness.broker.contains(&TransferKey::new(id, "secret.bin")));
    assert_eq!(harness.broker.stats().bytes, 0);
    assert!(!harness.registry.get(&id).unwrap().has_transfer("secret.bin"));
    assert!(stored_files(&harness, id).is_empty());
    assert!(harness.store.load_file(&id, "secret.bin").unwrap().is_none());
}

#[test]
fn test_filename_rejection_creates_no_state() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");
    let long = "a".repeat(300);

    for name in ["../etc/passwd", long.as_str(), "CON", "file;rm.txt"] {
        let packet = SendFileRequest {
            filename: name.to_string(),
            ..packets(&key, "placeholder", b"data", 1).remove(0)
        };
        // An over-long name cannot even be encoded into the fixed field
        let Ok(payload) = packet.encode() else {
            assert_eq!(name.len(), 300);
            continue;
        };
        let response = harness.send(id, RequestCode::SendFile, payload).unwrap();
        assert_eq!(response, Response::general_error());
    }
    assert_eq!(harness.broker.stats().transfers, 0);
    assert_eq!(harness.registry.get(&id).unwrap().transfer_count(), 0);

    let mut last = None;
    for packet in packets(&key, "report_2024.pdf", b"accepted", 1) {
        last = harness.send_packet(id, packet);
    }
    assert_eq!(last.unwrap().code, ResponseCode::FileChecksum);
}

#[test]
fn test_packet_without_transfer_is_rejected() {
    let harness = Harness::new();
    let (id, key) = harness.handshake("alice");
    let packets = packets(&key, "late.bin", &content(500), 3);

    let response = harness.send_packet(id, packets[1].clone()).unwrap();
    assert_eq!(response, Response::general_error());
    assert_eq!(harness.broker.stats().transfers, 0);
    assert!(!harness.broker.contains(&TransferKey::new(id, "late.bin")));
    let client = harness.registry.get(&id).unwrap();
    assert!(!client.has_transfer("late.bin"));
    assert_eq!(client.transfer_count(), 0);

    // Starting properly afterwards is unaffected
    let mut last = None;
    for index in [0, 2, 1] {
        last = harness.send_packet(id, packets[index].clone());
    }
    let checksum = FileChecksumResponse::decode(&last.unwrap().payload).unwrap();
    assert_eq!(checksum.filename, "late.bin");
    assert_eq!(harness.broker.stats().transfers, 0);
}

#[test]
fn test_send_before_key_exchange_fails() {
    let harness = Harness::new();
    let id = harness.register("alice");
    let key = SessionKey::from_bytes([1; 32]);
    let packet = packets(&key, "a.txt", b"abc", 1).remove(0);

    assert_eq!(
        harness.send_packet(id, packet).unwrap(),
        Response::general_error()
    );
}

// ============================================================================
// Broker limits through the dispatcher
// ============================================================================

#[test]
fn test_oldest_incomplete_transfer_is_evicted() {
    let harness = Harness::with_broker(BrokerConfig {
        max_concurrent_transfers: 1,
        ..BrokerConfig::default()
    });
    let (id, key) = harness.handshake("alice");

    let first = packets(&key, "first.bin", &content(400), 2);
    let second = packets(&key, "second.bin", &content(400), 2);
    assert!(harness.send_packet(id, first[0].clone()).is_none());
    assert!(harness.send_packet(id, second[0].clone()).is_none());

    let client = harness.registry.get(&id).unwrap();
    assert!(!client.has_transfer("first.bin"));
    assert!(client.has_transfer("second.bin"));

    // The evicted transfer's remaining packet has nowhere to go
    assert_eq!(
        harness.send_packet(id, first[1].clone()).unwrap(),
        Response::general_error()
    );
    let done = harness.send_packet(id, second[1].clone()).unwrap();
    assert_eq!(done.code, ResponseCode::FileChecksum);
}

#[test]
fn test_oversized_transfer_is_refused_and_released() {
    let harness = Harness::with_broker(BrokerConfig {
        max_bytes_per_transfer: 600,
        ..BrokerConfig::default()
    });
    let (id, key) = harness.handshake("alice");
    let packets = packets(&key, "big.bin", &content(1000), 2);

    assert!(harness.send_packet(id, packets[0].clone()).is_none());
    assert_eq!(
        harness.send_packet(id, packets[1].clone()).unwrap(),
        Response::general_error()
    );
    assert_eq!(harness.broker.stats().bytes, 0);
    assert!(!harness.registry.get(&id).unwrap().has_transfer("big.bin"));
}

#[test]
fn test_unknown_client_requests_fail() {
    let harness = Harness::new();
    let stranger = ClientId::from_bytes([0xee; 16]);
    assert_eq!(
        harness.crc_report(stranger, RequestCode::CrcOk, "a.txt").unwrap(),
        Response::general_error()
    );
    assert_eq!(
        harness.reconnect(stranger, "nobody"),
        Response::reconnect_denied(&stranger)
    );
}
