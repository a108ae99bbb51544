//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::{Arc, LazyLock};

use rand_core_06::OsRng;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use tempfile::TempDir;

use vault_common::protocol::{CLIENT_ID_SIZE, PUBLIC_KEY_FIELD_SIZE};
use vault_common::wire::{
    FileNameRequest, PublicKeyRequest, ReconnectRequest, RegisterRequest, Response,
    SendFileRequest,
};
use vault_common::{ClientId, RequestCode, ResponseCode};
use vault_server::clients::{ClientRegistry, RegistryConfig};
use vault_server::crypto::{SessionKey, encrypt_file};
use vault_server::db::{MemoryStore, MetadataStore};
use vault_server::handlers::{Request, RequestDispatcher};
use vault_server::transfers::{BrokerConfig, FileStorage, TransferEngine, TransferMemoryBroker};

/// One RSA key pair per test binary; generation is slow in debug builds
pub static CLIENT_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("RSA key generation failed"));

/// The client public key as it travels in a SubmitPublicKey payload
pub fn public_key_field() -> Vec<u8> {
    let der = CLIENT_KEY
        .to_public_key()
        .to_pkcs1_der()
        .expect("PKCS#1 encoding failed");
    let mut field = der.as_bytes().to_vec();
    field.resize(PUBLIC_KEY_FIELD_SIZE, 0);
    field
}

/// A full server core over temp storage and an in-memory store
pub struct Harness {
    pub temp_dir: TempDir,
    pub broker: Arc<TransferMemoryBroker>,
    pub registry: Arc<ClientRegistry>,
    pub engine: Arc<TransferEngine>,
    pub store: Arc<MemoryStore>,
    pub dispatcher: RequestDispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_broker(BrokerConfig::default())
    }

    pub fn with_broker(config: BrokerConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let broker = Arc::new(TransferMemoryBroker::new(config));
        let registry = Arc::new(ClientRegistry::new(
            RegistryConfig::default(),
            Arc::clone(&broker),
        ));
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(TransferEngine::new(
            Arc::clone(&registry),
            FileStorage::new(temp_dir.path()),
            Arc::clone(&store) as Arc<dyn MetadataStore>,
        ));
        let dispatcher = RequestDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            Arc::clone(&store) as Arc<dyn MetadataStore>,
        );
        Self {
            temp_dir,
            broker,
            registry,
            engine,
            store,
            dispatcher,
        }
    }

    pub fn send(&self, client_id: ClientId, code: RequestCode, payload: Vec<u8>) -> Option<Response> {
        self.dispatcher.dispatch(Request {
            client_id,
            version: 3,
            code: code.as_u16(),
            payload,
        })
    }

    /// Register `name` from `header_id`, returning the raw response
    pub fn register_as(&self, header_id: ClientId, name: &str) -> Response {
        let payload = RegisterRequest {
            name: name.to_string(),
        }
        .encode()
        .expect("encode register");
        self.send(header_id, RequestCode::Register, payload)
            .expect("register always responds")
    }

    /// Register a fresh client and return its issued id
    pub fn register(&self, name: &str) -> ClientId {
        let response = self.register_as(ClientId::default(), name);
        assert_eq!(response.code, ResponseCode::RegisterSuccess);
        ClientId::from_slice(&response.payload).expect("16-byte id")
    }

    /// Submit the shared public key and unwrap the issued session key
    pub fn submit_key(&self, id: ClientId, name: &str) -> SessionKey {
        let payload = PublicKeyRequest {
            name: name.to_string(),
            public_key: public_key_field(),
        }
        .encode()
        .expect("encode public key");
        let response = self
            .send(id, RequestCode::SubmitPublicKey, payload)
            .expect("public key always responds");
        assert_eq!(response.code, ResponseCode::PublicKeyAck);
        unwrap_session_key(&response)
    }

    pub fn reconnect(&self, id: ClientId, name: &str) -> Response {
        let payload = ReconnectRequest {
            name: name.to_string(),
        }
        .encode()
        .expect("encode reconnect");
        self.send(id, RequestCode::Reconnect, payload)
            .expect("reconnect always responds")
    }

    /// Register, then complete the key exchange
    pub fn handshake(&self, name: &str) -> (ClientId, SessionKey) {
        let id = self.register(name);
        let key = self.submit_key(id, name);
        (id, key)
    }

    pub fn send_packet(&self, id: ClientId, packet: SendFileRequest) -> Option<Response> {
        self.send(id, RequestCode::SendFile, packet.encode().expect("encode packet"))
    }

    pub fn crc_report(&self, id: ClientId, code: RequestCode, filename: &str) -> Option<Response> {
        let payload = FileNameRequest {
            filename: filename.to_string(),
        }
        .encode()
        .expect("encode filename");
        self.send(id, code, payload)
    }
}

/// Decrypt the wrapped session key carried after the client id
pub fn unwrap_session_key(response: &Response) -> SessionKey {
    let raw = CLIENT_KEY
        .decrypt(Oaep::new::<Sha1>(), &response.payload[CLIENT_ID_SIZE..])
        .expect("OAEP unwrap");
    let bytes: [u8; 32] = raw.try_into().expect("32-byte session key");
    SessionKey::from_bytes(bytes)
}

/// Encrypt `plaintext` and split the ciphertext into `count` packets
pub fn packets(key: &SessionKey, filename: &str, plaintext: &[u8], count: usize) -> Vec<SendFileRequest> {
    let ciphertext = encrypt_file(key, plaintext).expect("encrypt");
    let size = ciphertext.len().div_ceil(count);
    let chunks: Vec<&[u8]> = ciphertext.chunks(size).collect();
    let total = chunks.len() as u16;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| SendFileRequest {
            encrypted_size: chunk.len() as u32,
            original_size: plaintext.len() as u32,
            packet_number: i as u16 + 1,
            total_packets: total,
            filename: filename.to_string(),
            content: chunk.to_vec(),
        })
        .collect()
}
