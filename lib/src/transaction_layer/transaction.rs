use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::super::storage_layer::paged_storage::PagedStorage;
use super::super::storage_layer::storage::Storage;
use super::error::TransactionError;
use super::lock_manager::{CollectionLock, LockManager};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work over one or more collections.
///
/// Page changes stay in the transaction's buffer pool until [`Transaction::commit`].
/// Dropping a transaction that was not committed discards them, and the
/// collection locks are released in both cases.
pub struct Transaction {
    id: u64,
    storage: PagedStorage,
    held: Vec<CollectionLock>,
    locks: Arc<LockManager>,
    lock_timeout: Option<Duration>,
    active: bool,
}

impl Transaction {
    pub fn begin(
        storage: Arc<Storage>,
        locks: Arc<LockManager>,
        lock_timeout: Option<Duration>,
    ) -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(transaction = id, "begin");
        Self {
            id,
            storage: PagedStorage::new(storage),
            held: vec![],
            locks,
            lock_timeout,
            active: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Takes the exclusive lock on `collection` for the rest of the
    /// transaction. Locking a collection twice is a no-op.
    pub fn write_lock(&mut self, collection: &str) -> Result<(), TransactionError> {
        if self.holds_lock(collection) {
            return Ok(());
        }
        let lock = self.locks.write_lock(collection, self.lock_timeout)?;
        debug!(transaction = self.id, collection, "acquired write lock");
        self.held.push(lock);
        Ok(())
    }

    pub fn holds_lock(&self, collection: &str) -> bool {
        let key = collection.to_ascii_lowercase();
        self.held.iter().any(|lock| lock.collection() == key)
    }

    pub fn pages(&mut self) -> &mut PagedStorage {
        &mut self.storage
    }

    /// Writes every buffered page in one batch and releases the locks.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        let dirty = self.storage.buffer_pool().dirty_count();
        self.storage.flush()?;
        self.active = false;
        self.held.clear();
        info!(transaction = self.id, dirty_pages = dirty, "committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), TransactionError> {
        self.active = false;
        self.storage.discard()?;
        self.held.clear();
        info!(transaction = self.id, "rolled back");
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        match self.storage.discard() {
            Ok(()) => warn!(transaction = self.id, "dropped without commit, changes discarded"),
            Err(e) => warn!(transaction = self.id, error = %e, "failed to discard transaction"),
        }
    }
}
