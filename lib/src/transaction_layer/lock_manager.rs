use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::error::TransactionError;

/// Exclusive collection-level locks.
///
/// Names are compared case-insensitively, the same way the header resolves
/// collection names.
pub struct LockManager {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Blocks until the lock on `collection` is free. With a `timeout` the
    /// wait is bounded and ends in [`TransactionError::LockTimeout`].
    pub fn write_lock(
        self: &Arc<Self>,
        collection: &str,
        timeout: Option<Duration>,
    ) -> Result<CollectionLock, TransactionError> {
        let key = collection.to_ascii_lowercase();
        let started = Instant::now();
        let deadline = timeout.map(|timeout| started + timeout);

        let mut held = self.held.lock();
        if held.contains(&key) {
            debug!(collection, "waiting for collection lock");
        }
        while held.contains(&key) {
            match deadline {
                Some(deadline) => {
                    let result = self.released.wait_until(&mut held, deadline);
                    if result.timed_out() && held.contains(&key) {
                        return Err(TransactionError::LockTimeout {
                            collection: collection.to_owned(),
                            waited: started.elapsed(),
                        });
                    }
                }
                None => self.released.wait(&mut held),
            }
        }
        held.insert(key.clone());

        Ok(CollectionLock {
            manager: Arc::clone(self),
            key,
        })
    }

    pub fn is_locked(&self, collection: &str) -> bool {
        self.held.lock().contains(&collection.to_ascii_lowercase())
    }

    fn release(&self, key: &str) {
        self.held.lock().remove(key);
        self.released.notify_all();
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Held write lock; released on drop.
pub struct CollectionLock {
    manager: Arc<LockManager>,
    key: String,
}

impl CollectionLock {
    /// Normalized name of the locked collection.
    pub fn collection(&self) -> &str {
        &self.key
    }
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        self.manager.release(&self.key);
    }
}
