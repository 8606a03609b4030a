//! Keyed mutual exclusion for subscriptions and advertisers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Registry = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Registry of async mutexes keyed by entity id.
///
/// Every mutation of a subscription holds its guard for the whole
/// read-modify-write, so a payment and a lifecycle action on the same
/// subscription never interleave. Guards for different ids are independent.
/// An entry lives only while someone holds or waits for it.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Registry,
}

/// Held lock for one id. Dropping the last guard for an id removes its entry.
pub struct KeyedGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    registry: Registry,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Unlock first so the registry's Arc is the only one left when idle.
        self.guard.take();
        self.registry
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyedGuard {
            guard: Some(guard),
            key: key.to_string(),
            registry: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
