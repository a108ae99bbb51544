//! Per-transfer lock table
//!
//! Packets for the same `(client, filename)` pair are processed one at a
//! time; different pairs never wait on each other. Slots are created on
//! first use and removed when the last holder or waiter releases them, so
//! the table only ever contains pairs with a packet in progress.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use super::TransferKey;

#[derive(Default)]
struct Slot {
    busy: Mutex<bool>,
    released: Condvar,
}

/// Lazily populated table of per-transfer locks
#[derive(Default)]
pub struct TransferLocks {
    slots: Mutex<HashMap<TransferKey, Arc<Slot>>>,
}

impl TransferLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `key` is free, then take it
    pub fn acquire(&self, key: &TransferKey) -> TransferLockGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().expect("transfer lock table poisoned");
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        {
            let mut busy = slot.busy.lock().expect("transfer lock slot poisoned");
            while *busy {
                busy = slot
                    .released
                    .wait(busy)
                    .expect("transfer lock slot poisoned");
            }
            *busy = true;
        }

        TransferLockGuard {
            table: self,
            key: key.clone(),
            slot,
        }
    }

    /// Number of pairs with a holder or waiter
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .expect("transfer lock table poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds one pair's lock; releasing it may discard the slot
pub struct TransferLockGuard<'a> {
    table: &'a TransferLocks,
    key: TransferKey,
    slot: Arc<Slot>,
}

impl Drop for TransferLockGuard<'_> {
    fn drop(&mut self) {
        *self.slot.busy.lock().expect("transfer lock slot poisoned") = false;
        self.slot.released.notify_one();

        // Only the table and this guard reference the slot: nobody is waiting
        let mut slots = self
            .table
            .slots
            .lock()
            .expect("transfer lock table poisoned");
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}
