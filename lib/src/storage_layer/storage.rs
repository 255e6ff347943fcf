use marble::Marble;
use parking_lot::{Mutex, MutexGuard};
use std::path::Path;
use tracing::{debug, info};

use super::error::StorageError;
use super::header::{FILE_VERSION, HeaderPage, SALT_SIZE};
use super::indices::HEADER_PAGE_ID;
use super::page::{EMPTY_PAGE_ID, Page, PageId, PageType};
use super::utils::{encode, load};

/// Header edits staged by a transaction and applied at commit.
pub type HeaderEdit<'a> = dyn FnOnce(&mut HeaderPage) -> Result<(), StorageError> + 'a;

/// Page store shared by every transaction.
///
/// Committed pages live in marble, one object per page. The header is kept in
/// memory behind a mutex; page allocation mutates it immediately, everything
/// else reaches it through [`Storage::commit`].
pub struct Storage {
    marble: Marble,
    header: Mutex<HeaderPage>,
}

impl Storage {
    /// Opens the store at `path`, creating a new header if the store is empty.
    /// `user_version` and `salt` are ignored if the header already exists.
    pub fn open<P: AsRef<Path>>(
        path: P,
        user_version: u16,
        salt: [u8; SALT_SIZE],
    ) -> Result<Self, StorageError> {
        let marble = marble::open(path.as_ref())?;

        let header = match marble.read(u64::from(HEADER_PAGE_ID))? {
            Some(data) => HeaderPage::decode(&data[..])?,
            None => {
                let header = HeaderPage::new(user_version, salt);
                let encoded = header.encode()?;
                marble.write_batch([(u64::from(HEADER_PAGE_ID), Some(&encoded))])?;
                info!(path = %path.as_ref().display(), "created new database file");
                header
            }
        };

        info!(
            path = %path.as_ref().display(),
            version = FILE_VERSION,
            collections = header.collections.len(),
            "opened database"
        );

        Ok(Self {
            marble,
            header: Mutex::new(header),
        })
    }

    /// Snapshot of the committed header.
    pub fn header(&self) -> HeaderPage {
        self.header.lock().clone()
    }

    pub(crate) fn lock_header(&self) -> MutexGuard<'_, HeaderPage> {
        self.header.lock()
    }

    /// Read a committed page
    pub fn read_page(&self, id: PageId) -> Result<Page, StorageError> {
        if id == HEADER_PAGE_ID || id == EMPTY_PAGE_ID {
            return Err(StorageError::InvalidOperation);
        }

        match load::<Page>(&self.marble, id)? {
            Some(page) => Ok(page),
            None => Err(StorageError::PageNotFound(id)),
        }
    }

    /// Reserves a page id: the head of the free chain, or a brand new id.
    pub fn allocate_id(&self) -> Result<PageId, StorageError> {
        let mut header = self.header.lock();

        if header.free_empty_page_id != EMPTY_PAGE_ID {
            let id = header.free_empty_page_id;
            let page = self.read_page(id)?;
            page.expect_type(PageType::Empty)?;
            header.free_empty_page_id = page.header.next_page_id;
            debug!(page_id = id, "reused free page");
            return Ok(id);
        }

        let id = header
            .last_page_id
            .checked_add(1)
            .filter(|id| *id != EMPTY_PAGE_ID)
            .ok_or(StorageError::InvalidOperation)?;
        header.last_page_id = id;
        debug!(page_id = id, "allocated new page");
        Ok(id)
    }

    /// Atomically writes `pages`, pushes `freed` onto the free chain and
    /// applies `edit` to the header. Either everything lands or nothing does.
    pub fn commit(
        &self,
        pages: Vec<Page>,
        freed: Vec<PageId>,
        edit: Box<HeaderEdit<'_>>,
    ) -> Result<(), StorageError> {
        let mut header = self.header.lock();
        let mut staged = header.clone();
        edit(&mut staged)?;

        let mut batch: Vec<(u64, Vec<u8>)> = Vec::with_capacity(pages.len() + freed.len() + 1);
        for page in pages.iter() {
            batch.push((u64::from(page.id()), encode(page)?));
        }
        for id in freed {
            let empty = Page::new_empty(id, staged.free_empty_page_id);
            staged.free_empty_page_id = id;
            batch.push((u64::from(id), encode(&empty)?));
        }
        batch.push((u64::from(HEADER_PAGE_ID), staged.encode()?));

        self.marble
            .write_batch(batch.iter().map(|(id, data)| (*id, Some(data.as_slice()))))?;

        *header = staged;
        Ok(())
    }

    /// Returns ids reserved by an abandoned transaction to the free chain.
    pub fn release(&self, reserved: Vec<PageId>) -> Result<(), StorageError> {
        if reserved.is_empty() {
            return Ok(());
        }

        let mut header = self.header.lock();
        let mut staged = header.clone();

        let mut batch: Vec<(u64, Vec<u8>)> = Vec::with_capacity(reserved.len() + 1);
        for id in reserved {
            let empty = Page::new_empty(id, staged.free_empty_page_id);
            staged.free_empty_page_id = id;
            batch.push((u64::from(id), encode(&empty)?));
        }
        batch.push((u64::from(HEADER_PAGE_ID), staged.encode()?));

        self.marble
            .write_batch(batch.iter().map(|(id, data)| (*id, Some(data.as_slice()))))?;

        *header = staged;
        Ok(())
    }

    /// Run maintenance to garbage collect and defragment storage
    pub fn maintenance(&self) -> Result<usize, StorageError> {
        let objects_defragmented = self.marble.maintenance()?;
        Ok(objects_defragmented)
    }
}
