use super::collection_page::CollectionPage;
use super::error::StorageError;
use super::page::{Page, PageId, PageType};
use super::storage::Storage;

use tracing::debug;

use std::collections::HashMap;
use std::sync::Arc;

/// Pages touched by one transaction.
///
/// Nothing written here is visible to other transactions until [`BufferPool::flush`]
/// hands the dirty pages to [`Storage::commit`] as one atomic batch.
pub struct BufferPool {
    storage: Arc<Storage>,
    pages: HashMap<PageId, (Page, bool)>, // (page, dirty)
    //ids taken from the allocator, handed back if the transaction is discarded
    reserved: Vec<PageId>,
    freed: Vec<PageId>,
    new_collections: Vec<(String, PageId)>,
    user_version: Option<u16>,
}

impl BufferPool {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            pages: HashMap::new(),
            reserved: vec![],
            freed: vec![],
            new_collections: vec![],
            user_version: None,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    //place page into the buffer
    fn bump_page(&mut self, id: PageId) -> Result<(), StorageError> {
        if self.freed.contains(&id) {
            return Err(StorageError::PageNotFound(id));
        }
        if !self.pages.contains_key(&id) {
            let page = self.storage.read_page(id)?;
            self.pages.insert(id, (page, false));
        }
        Ok(())
    }

    pub fn get_page(&mut self, id: PageId) -> Result<&Page, StorageError> {
        self.bump_page(id)?;
        self.pages
            .get(&id)
            .map(|entry| &entry.0)
            .ok_or(StorageError::PageNotFound(id))
    }

    /// Mutable access; the page is marked dirty.
    pub fn get_page_mut(&mut self, id: PageId) -> Result<&mut Page, StorageError> {
        self.bump_page(id)?;
        let entry = self
            .pages
            .get_mut(&id)
            .ok_or(StorageError::PageNotFound(id))?;
        entry.1 = true;
        Ok(&mut entry.0)
    }

    pub fn allocate_page(&mut self, page_type: PageType) -> Result<&mut Page, StorageError> {
        let id = self.storage.allocate_id()?;
        self.reserved.push(id);
        self.pages.insert(id, (Page::new_slotted(id, page_type), true));
        self.get_page_mut(id)
    }

    pub fn allocate_collection(&mut self, name: &str) -> Result<PageId, StorageError> {
        let id = self.storage.allocate_id()?;
        self.reserved.push(id);
        self.pages
            .insert(id, (Page::new_collection(id, CollectionPage::new(name)), true));
        Ok(id)
    }

    /// Stages `id` for the free chain. The page becomes unreadable in this transaction.
    pub fn delete_page(&mut self, id: PageId) {
        self.pages.remove(&id);
        if !self.freed.contains(&id) {
            self.freed.push(id);
        }
        debug!(page_id = id, "staged page for the free chain");
    }

    pub fn stage_collection(&mut self, name: &str, page_id: PageId) {
        self.new_collections.push((name.to_owned(), page_id));
    }

    pub fn stage_user_version(&mut self, user_version: u16) {
        self.user_version = Some(user_version);
    }

    /// Looks up a collection among staged and committed entries.
    pub fn collection_page_id(&self, name: &str) -> Option<PageId> {
        self.new_collections
            .iter()
            .find(|(staged, _)| staged.eq_ignore_ascii_case(name))
            .map(|(_, page_id)| *page_id)
            .or_else(|| self.storage.lock_header().collections.get(name))
    }

    pub fn dirty_count(&self) -> usize {
        self.pages.values().filter(|(_, dirty)| *dirty).count()
    }

    fn is_clean(&self) -> bool {
        self.dirty_count() == 0
            && self.freed.is_empty()
            && self.reserved.is_empty()
            && self.new_collections.is_empty()
            && self.user_version.is_none()
    }

    /// Commits every staged change at once. A transaction that changed
    /// nothing writes nothing.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.is_clean() {
            self.pages.clear();
            return Ok(());
        }

        let pages: Vec<Page> = self
            .pages
            .values()
            .filter(|(_, dirty)| *dirty)
            .map(|(page, _)| page.clone())
            .collect();
        let freed = self.freed.clone();
        let new_collections = self.new_collections.clone();
        let user_version = self.user_version;

        self.storage.commit(
            pages,
            freed,
            Box::new(move |header| {
                for (name, page_id) in new_collections.iter() {
                    header.collections.insert(name, *page_id)?;
                }
                if let Some(user_version) = user_version {
                    header.user_version = user_version;
                }
                Ok(())
            }),
        )?;

        self.pages.clear();
        self.reserved.clear();
        self.freed.clear();
        self.new_collections.clear();
        self.user_version = None;
        Ok(())
    }

    /// Drops every staged change and returns reserved ids to the allocator.
    pub fn discard(&mut self) -> Result<(), StorageError> {
        self.pages.clear();
        self.freed.clear();
        self.new_collections.clear();
        self.user_version = None;

        let reserved = std::mem::take(&mut self.reserved);
        self.storage.release(reserved)
    }
}
