//! A registered backup client

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use vault_common::ClientId;

use super::transfer::TransferState;
use crate::crypto::SessionKey;

/// Mutable per-client state, guarded by the client's own lock
#[derive(Debug)]
pub struct ClientState {
    pub public_key: Option<Vec<u8>>,
    /// Replaced wholesale on every handshake
    pub session_key: Option<SessionKey>,
    pub last_active: Instant,
    /// In-flight transfers keyed by filename
    pub transfers: HashMap<String, TransferState>,
}

/// A client known to this server
///
/// `id` and `name` never change after creation. Everything else lives behind
/// a per-client mutex so unrelated clients never contend.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    name: String,
    state: Mutex<ClientState>,
}

impl Client {
    pub fn new(id: ClientId, name: String, public_key: Option<Vec<u8>>) -> Self {
        Self {
            id,
            name,
            state: Mutex::new(ClientState {
                public_key,
                session_key: None,
                last_active: Instant::now(),
                transfers: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lock the mutable state
    pub fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().expect("client state lock poisoned")
    }

    pub fn public_key(&self) -> Option<Vec<u8>> {
        self.lock_state().public_key.clone()
    }

    pub fn set_public_key(&self, public_key: Vec<u8>) {
        self.lock_state().public_key = Some(public_key);
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        self.lock_state().session_key.clone()
    }

    /// Install a new session key, discarding the previous one
    pub fn replace_session_key(&self, key: SessionKey) {
        self.lock_state().session_key = Some(key);
    }

    /// Record activity now
    pub fn touch(&self) {
        self.lock_state().last_active = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.lock_state().last_active)
    }

    pub fn transfer_count(&self) -> usize {
        self.lock_state().transfers.len()
    }

    pub fn has_transfer(&self, filename: &str) -> bool {
        self.lock_state().transfers.contains_key(filename)
    }
}
