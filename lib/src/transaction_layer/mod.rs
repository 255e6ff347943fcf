pub mod error;
pub mod lock_manager;
pub mod transaction;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::super::storage_layer::error::StorageError;
    use super::super::storage_layer::header::SALT_SIZE;
    use super::super::storage_layer::page::{PageAddress, PageType};
    use super::super::storage_layer::storage::Storage;
    use super::error::TransactionError;
    use super::lock_manager::LockManager;
    use super::transaction::Transaction;

    fn open(dir: &TempDir) -> (Arc<Storage>, Arc<LockManager>) {
        let storage = Arc::new(Storage::open(dir.path(), 0, [0u8; SALT_SIZE]).unwrap());
        (storage, Arc::new(LockManager::new()))
    }

    fn write_item(tx: &mut Transaction, data: &[u8]) -> PageAddress {
        let page_id = tx.pages().allocate_page(PageType::Data).unwrap();
        tx.pages().insert_data(page_id, PageType::Data, data).unwrap()
    }

    #[test]
    fn commit_visibility_test() {
        let dir = TempDir::new().unwrap();
        let (storage, locks) = open(&dir);

        let mut writer = Transaction::begin(storage.clone(), locks.clone(), None);
        writer.write_lock("users").unwrap();
        let address = write_item(&mut writer, b"first");

        //nothing is visible before commit
        let mut reader = Transaction::begin(storage.clone(), locks.clone(), None);
        assert!(matches!(
            reader.pages().read_data(address, PageType::Data),
            Err(StorageError::PageNotFound(_))
        ));
        reader.commit().unwrap();

        writer.commit().unwrap();
        assert!(!locks.is_locked("users"));

        let mut reader = Transaction::begin(storage.clone(), locks.clone(), None);
        assert_eq!(
            reader.pages().read_data(address, PageType::Data).unwrap(),
            b"first"
        );
        reader.commit().unwrap();

        //and it survives a reopen
        drop(storage);
        let (storage, locks) = open(&dir);
        let mut reader = Transaction::begin(storage, locks, None);
        assert_eq!(
            reader.pages().read_data(address, PageType::Data).unwrap(),
            b"first"
        );
    }

    #[test]
    fn rollback_test() {
        let dir = TempDir::new().unwrap();
        let (storage, locks) = open(&dir);
        let before = storage.header();

        let mut tx = Transaction::begin(storage.clone(), locks.clone(), None);
        tx.write_lock("users").unwrap();
        let rolled_back = write_item(&mut tx, b"gone");
        tx.rollback().unwrap();
        assert!(!locks.is_locked("users"));

        //the reserved page went to the free chain instead of leaking
        let header = storage.header();
        assert_eq!(header.free_empty_page_id, rolled_back.page_id);
        assert_eq!(header.collections.len(), before.collections.len());

        {
            let mut tx = Transaction::begin(storage.clone(), locks.clone(), None);
            tx.write_lock("users").unwrap();
            let _ = write_item(&mut tx, b"dropped");
            //dropped without commit
        }
        assert!(!locks.is_locked("users"));

        let mut tx = Transaction::begin(storage.clone(), locks.clone(), None);
        let reused = write_item(&mut tx, b"kept");
        assert_eq!(reused.page_id, rolled_back.page_id);
        tx.commit().unwrap();

        let mut reader = Transaction::begin(storage, locks, None);
        assert_eq!(
            reader.pages().read_data(reused, PageType::Data).unwrap(),
            b"kept"
        );
    }

    #[test]
    fn empty_commit_test() {
        let dir = TempDir::new().unwrap();
        let (storage, locks) = open(&dir);
        let before = storage.header();

        let mut tx = Transaction::begin(storage.clone(), locks.clone(), None);
        tx.write_lock("users").unwrap();
        tx.write_lock("Users").unwrap();
        assert!(tx.holds_lock("USERS"));
        tx.commit().unwrap();

        assert_eq!(storage.header(), before);
        assert!(!locks.is_locked("users"));
    }

    #[test]
    fn lock_timeout_test() {
        let dir = TempDir::new().unwrap();
        let (storage, locks) = open(&dir);

        let mut holder = Transaction::begin(storage.clone(), locks.clone(), None);
        holder.write_lock("users").unwrap();

        let handle = {
            let storage = storage.clone();
            let locks = locks.clone();
            thread::spawn(move || {
                let mut tx =
                    Transaction::begin(storage, locks, Some(Duration::from_millis(50)));
                let same = match tx.write_lock("Users") {
                    Err(TransactionError::LockTimeout { collection, waited }) => {
                        Some((collection, waited))
                    }
                    _ => None,
                };
                let other = tx.write_lock("orders");
                (same, other.is_ok())
            })
        };

        let (same, other) = handle.join().unwrap();
        let (collection, waited) = same.expect("expected a lock timeout");
        assert_eq!(collection, "Users");
        assert!(waited >= Duration::from_millis(50));
        assert!(other);
        holder.commit().unwrap();
    }

    #[test]
    fn lock_blocks_until_release_test() {
        let dir = TempDir::new().unwrap();
        let (storage, locks) = open(&dir);
        let released = Arc::new(AtomicBool::new(false));

        let mut holder = Transaction::begin(storage.clone(), locks.clone(), None);
        holder.write_lock("users").unwrap();

        let handle = {
            let storage = storage.clone();
            let locks = locks.clone();
            let released = released.clone();
            thread::spawn(move || {
                let mut tx = Transaction::begin(storage, locks, None);
                tx.write_lock("users").unwrap();
                let saw_release = released.load(Ordering::SeqCst);
                tx.commit().unwrap();
                saw_release
            })
        };

        thread::sleep(Duration::from_millis(100));
        released.store(true, Ordering::SeqCst);
        holder.commit().unwrap();

        assert!(handle.join().unwrap());
        assert!(!locks.is_locked("users"));
    }
}
