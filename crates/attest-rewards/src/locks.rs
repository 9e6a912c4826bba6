use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Global key serializing funds consolidation.
pub const MOVE_FUNDS_KEY: &str = "move-funds";

/// Per-key advisory locks.
///
/// Waiters on one key are served in FIFO order (tokio's mutex is fair).
/// Entries are created on first use and removed when the last holder or
/// waiter goes away, so the table only holds keys that are in use.
#[derive(Default)]
pub struct KeyedLockTable {
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`. Released when the guard drops,
    /// on every exit path.
    pub async fn acquire(&self, key: impl Into<String>) -> KeyGuard {
        let key = key.into();
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key.clone()).or_default().clone()
        };

        trace!(key = %key, "Waiting for lock");
        let guard = mutex.clone().lock_owned().await;
        trace!(key = %key, "Lock acquired");

        KeyGuard {
            key,
            mutex,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct KeyGuard {
    key: String,
    mutex: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release before inspecting the table so a waiter can proceed.
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the table, one here: nobody else holds or waits.
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.key);
        }
        trace!(key = %self.key, "Lock released");
    }
}
