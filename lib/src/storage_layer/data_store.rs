//! Data blocks: the stored bytes of one document.
//!
//! A payload larger than one page is split into chunks linked through
//! `next_block`; the first chunk's address is the document's position.

use std::collections::HashSet;

use bincode::{Decode, Encode};
use tracing::debug;

use super::collection_page::CollectionPage;
use super::error::StorageError;
use super::page::{EMPTY_PAGE_ID, MAX_ITEM_SIZE, PageAddress, PageType};
use super::paged_storage::PagedStorage;
use super::utils::encode;

/// Encoded size of a block around its payload: next_block (6) plus the length prefix (8).
const DATA_BLOCK_OVERHEAD: usize = 14;
pub const MAX_DATA_CHUNK: usize = MAX_ITEM_SIZE - DATA_BLOCK_OVERHEAD;

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct DataBlock {
    pub next_block: PageAddress,
    pub buffer: Vec<u8>,
}

pub struct DataStore;

impl DataStore {
    /// Stores `data` and returns the position of its first block.
    pub fn insert(
        storage: &mut PagedStorage,
        collection: &mut CollectionPage,
        data: &[u8],
    ) -> Result<PageAddress, StorageError> {
        let mut chunks = Self::chunks(data);
        let first = chunks.remove(0);
        let next_block = Self::insert_chain(storage, collection, &chunks)?;

        Self::insert_block(
            storage,
            collection,
            &DataBlock {
                next_block,
                buffer: first.to_vec(),
            },
        )
    }

    /// Reads the full payload starting at `position`.
    pub fn read(storage: &mut PagedStorage, position: PageAddress) -> Result<Vec<u8>, StorageError> {
        let mut data = vec![];
        let mut visited = HashSet::new();
        let mut current = position;

        while !current.is_empty() {
            //a block chain that loops back on itself is corrupt
            if !visited.insert(current) {
                return Err(StorageError::InvalidOperation);
            }
            let block: DataBlock = storage.read(current, PageType::Data)?;
            data.extend_from_slice(&block.buffer);
            current = block.next_block;
        }

        Ok(data)
    }

    /// Replaces the payload at `position`. The first block is rewritten in
    /// place when it still fits its page, otherwise it moves and the new
    /// position is returned.
    pub fn update(
        storage: &mut PagedStorage,
        collection: &mut CollectionPage,
        position: PageAddress,
        data: &[u8],
    ) -> Result<PageAddress, StorageError> {
        let head: DataBlock = storage.read(position, PageType::Data)?;
        Self::delete_chain(storage, collection, head.next_block)?;

        let mut chunks = Self::chunks(data);
        let first = chunks.remove(0);
        let next_block = Self::insert_chain(storage, collection, &chunks)?;
        let block = DataBlock {
            next_block,
            buffer: first.to_vec(),
        };

        match storage.write(position, PageType::Data, &block) {
            Ok(()) => Ok(position),
            Err(StorageError::PageFull) => {
                Self::delete_block(storage, collection, position)?;
                let relocated = Self::insert_block(storage, collection, &block)?;
                debug!(from = %position, to = %relocated, "relocated data block");
                Ok(relocated)
            }
            Err(e) => Err(e),
        }
    }

    /// Removes every block of the payload at `position`.
    pub fn delete(
        storage: &mut PagedStorage,
        collection: &mut CollectionPage,
        position: PageAddress,
    ) -> Result<(), StorageError> {
        Self::delete_chain(storage, collection, position)
    }

    fn chunks(data: &[u8]) -> Vec<&[u8]> {
        if data.is_empty() {
            return vec![data];
        }
        data.chunks(MAX_DATA_CHUNK).collect()
    }

    //writes chunks back to front so every block knows its successor
    fn insert_chain(
        storage: &mut PagedStorage,
        collection: &mut CollectionPage,
        chunks: &[&[u8]],
    ) -> Result<PageAddress, StorageError> {
        let mut next_block = PageAddress::EMPTY;
        for chunk in chunks.iter().rev() {
            next_block = Self::insert_block(
                storage,
                collection,
                &DataBlock {
                    next_block,
                    buffer: chunk.to_vec(),
                },
            )?;
        }
        Ok(next_block)
    }

    fn insert_block(
        storage: &mut PagedStorage,
        collection: &mut CollectionPage,
        block: &DataBlock,
    ) -> Result<PageAddress, StorageError> {
        let encoded = encode(block)?;

        if collection.last_data_page_id != EMPTY_PAGE_ID {
            match storage.insert_data(collection.last_data_page_id, PageType::Data, &encoded) {
                Err(StorageError::PageFull) => {}
                other => return other,
            }
        }

        let page_id = storage.allocate_page(PageType::Data)?;
        collection.last_data_page_id = page_id;
        storage.insert_data(page_id, PageType::Data, &encoded)
    }

    fn delete_block(
        storage: &mut PagedStorage,
        collection: &CollectionPage,
        position: PageAddress,
    ) -> Result<(), StorageError> {
        let page_empty = storage.cut_data(position, PageType::Data)?;
        if page_empty && position.page_id != collection.last_data_page_id {
            storage.delete_page(position.page_id);
        }
        Ok(())
    }

    fn delete_chain(
        storage: &mut PagedStorage,
        collection: &CollectionPage,
        position: PageAddress,
    ) -> Result<(), StorageError> {
        let mut current = position;
        while !current.is_empty() {
            let block: DataBlock = storage.read(current, PageType::Data)?;
            Self::delete_block(storage, collection, current)?;
            current = block.next_block;
        }
        Ok(())
    }
}
