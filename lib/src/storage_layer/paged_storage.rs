use super::buffer_pool::BufferPool;
use super::collection_page::CollectionPage;
use super::error::StorageError;
use super::page::{PageAddress, PageId, PageType};
use super::storage::Storage;
use super::utils::{decode, encode};

use bincode::{Decode, Encode};

use std::sync::Arc;

/// Item-level access to the pages of one transaction.
pub struct PagedStorage {
    buffer_pool: BufferPool,
}

impl PagedStorage {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            buffer_pool: BufferPool::new(storage),
        }
    }

    pub fn storage(&self) -> &Storage {
        self.buffer_pool.storage()
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn buffer_pool_mut(&mut self) -> &mut BufferPool {
        &mut self.buffer_pool
    }

    pub fn allocate_page(&mut self, page_type: PageType) -> Result<PageId, StorageError> {
        Ok(self.buffer_pool.allocate_page(page_type)?.id())
    }

    pub fn delete_page(&mut self, id: PageId) {
        self.buffer_pool.delete_page(id)
    }

    pub fn free_bytes(&mut self, page_id: PageId) -> Result<usize, StorageError> {
        Ok(self.buffer_pool.get_page(page_id)?.free_bytes())
    }

    /// Store data in a free slot of the page
    pub fn insert_data(
        &mut self,
        page_id: PageId,
        page_type: PageType,
        data: &[u8],
    ) -> Result<PageAddress, StorageError> {
        let page = self.buffer_pool.get_page_mut(page_id)?;
        page.expect_type(page_type)?;
        let index = page.insert_item(data)?;
        Ok(PageAddress::new(page_id, index))
    }

    /// Read data from a slot
    pub fn read_data(
        &mut self,
        address: PageAddress,
        page_type: PageType,
    ) -> Result<Vec<u8>, StorageError> {
        if address.is_empty() {
            return Err(StorageError::InvalidOperation);
        }
        let page = self.buffer_pool.get_page(address.page_id)?;
        page.expect_type(page_type)?;
        Ok(page.item(address.index)?.to_vec())
    }

    /// Overwrite the data of a slot
    pub fn write_data(
        &mut self,
        address: PageAddress,
        page_type: PageType,
        data: &[u8],
    ) -> Result<(), StorageError> {
        if address.is_empty() {
            return Err(StorageError::InvalidOperation);
        }
        let page = self.buffer_pool.get_page_mut(address.page_id)?;
        page.expect_type(page_type)?;
        page.update_item(address.index, data)
    }

    /// Vacate a slot. Returns true if the page holds no items afterwards.
    pub fn cut_data(
        &mut self,
        address: PageAddress,
        page_type: PageType,
    ) -> Result<bool, StorageError> {
        if address.is_empty() {
            return Err(StorageError::InvalidOperation);
        }
        let page = self.buffer_pool.get_page_mut(address.page_id)?;
        page.expect_type(page_type)?;
        page.delete_item(address.index)?;
        Ok(page.item_count() == 0)
    }

    pub fn insert<T: Encode>(
        &mut self,
        page_id: PageId,
        page_type: PageType,
        item: &T,
    ) -> Result<PageAddress, StorageError> {
        self.insert_data(page_id, page_type, &encode(item)?)
    }

    pub fn read<T: Decode<()>>(
        &mut self,
        address: PageAddress,
        page_type: PageType,
    ) -> Result<T, StorageError> {
        decode(&self.read_data(address, page_type)?)
    }

    pub fn write<T: Encode>(
        &mut self,
        address: PageAddress,
        page_type: PageType,
        item: &T,
    ) -> Result<(), StorageError> {
        self.write_data(address, page_type, &encode(item)?)
    }

    pub fn read_collection(&mut self, page_id: PageId) -> Result<CollectionPage, StorageError> {
        Ok(self.buffer_pool.get_page(page_id)?.collection()?.clone())
    }

    pub fn write_collection(
        &mut self,
        page_id: PageId,
        collection: &CollectionPage,
    ) -> Result<(), StorageError> {
        *self.buffer_pool.get_page_mut(page_id)?.collection_mut()? = collection.clone();
        Ok(())
    }

    /// Flush all dirty pages
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.buffer_pool.flush()
    }

    pub fn discard(&mut self) -> Result<(), StorageError> {
        self.buffer_pool.discard()
    }
}
