//! Shared test utilities for handler tests

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use rand_core_06::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPublicKey;
use tempfile::TempDir;
use vault_common::ClientId;
use vault_common::protocol::PUBLIC_KEY_FIELD_SIZE;

use super::HandlerContext;
use crate::clients::{Client, ClientRegistry, RegistryConfig};
use crate::db::{ClientRecord, MemoryStore, MetadataStore};
use crate::transfers::{BrokerConfig, FileStorage, TransferEngine, TransferMemoryBroker};

// ========================================================================
// Cached RSA Key
// ========================================================================
//
// RSA key generation takes a noticeable fraction of a second in debug
// builds. Every handler test shares one key pair.

/// Key pair shared by all handler tests
pub static TEST_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("RSA key generation failed"));

/// The shared public key as a zero-padded PKCS#1 DER key field
pub fn public_key_field() -> Vec<u8> {
    let der = TEST_KEY
        .to_public_key()
        .to_pkcs1_der()
        .expect("PKCS#1 encoding failed");
    let mut field = der.as_bytes().to_vec();
    field.resize(PUBLIC_KEY_FIELD_SIZE, 0);
    field
}

/// Registry, engine, store and storage root for one test
pub struct TestContext {
    pub registry: Arc<ClientRegistry>,
    pub engine: Arc<TransferEngine>,
    pub store: Arc<MemoryStore>,
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_broker(BrokerConfig::default())
    }

    pub fn with_broker(config: BrokerConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let broker = Arc::new(TransferMemoryBroker::new(config));
        let registry = Arc::new(ClientRegistry::new(RegistryConfig::default(), broker));
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(TransferEngine::new(
            Arc::clone(&registry),
            FileStorage::new(temp_dir.path()),
            Arc::clone(&store) as Arc<dyn MetadataStore>,
        ));
        Self {
            registry,
            engine,
            store,
            temp_dir,
        }
    }

    pub fn context(&self) -> HandlerContext<'_> {
        HandlerContext {
            registry: &self.registry,
            engine: &self.engine,
            store: self.store.as_ref(),
        }
    }

    /// Add a client to the registry and the store, optionally with the shared key
    pub fn add_client(&self, byte: u8, name: &str, with_key: bool) -> Arc<Client> {
        let key = with_key.then(public_key_field);
        let client = self
            .registry
            .register(ClientId::from_bytes([byte; 16]), name, key)
            .expect("test client registration failed");
        self.context()
            .save_client(&client)
            .expect("test client save failed");
        client
    }

    /// Save a client record to the store only, as if it had expired from memory
    pub fn add_stored_client(&self, byte: u8, name: &str) -> ClientId {
        let id = ClientId::from_bytes([byte; 16]);
        self.store
            .save_client(&ClientRecord {
                id,
                name: name.to_string(),
                public_key: Some(public_key_field()),
                last_seen: Utc::now(),
            })
            .expect("test client save failed");
        id
    }
}
