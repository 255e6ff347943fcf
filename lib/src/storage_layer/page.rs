use std::fmt;

use bincode::{Decode, Encode};

use super::collection_page::CollectionPage;
use super::error::StorageError;

pub type PageId = u32;

/// Sentinel page id meaning "no page".
pub const EMPTY_PAGE_ID: PageId = PageId::MAX;

/// Capacity of a single page in bytes.
pub const PAGE_SIZE: usize = 8192;
/// Space reserved for the page header.
pub const PAGE_HEADER_SIZE: usize = 32;
/// Bookkeeping cost of one occupied slot.
pub const ITEM_OVERHEAD: usize = 16;
/// Bookkeeping cost of one vacant slot.
pub const VACANT_SLOT_OVERHEAD: usize = 1;
/// Largest item a slotted page can hold.
pub const MAX_ITEM_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE - ITEM_OVERHEAD;

/// Stable address of an item: the page it lives in and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct PageAddress {
    pub page_id: PageId,
    pub index: u16,
}

impl PageAddress {
    /// Explicit "missing reference" value.
    pub const EMPTY: PageAddress = PageAddress {
        page_id: EMPTY_PAGE_ID,
        index: u16::MAX,
    };

    pub fn new(page_id: PageId, index: u16) -> Self {
        Self { page_id, index }
    }

    pub fn is_empty(&self) -> bool {
        self.page_id == EMPTY_PAGE_ID
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "(empty)")
        } else {
            write!(f, "{}:{}", self.page_id, self.index)
        }
    }
}

/// Page types supported by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum PageType {
    Header,
    Collection,
    Index,
    Data,
    Empty,
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Header for a database page
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct PageHeader {
    /// Unique identifier for this page
    pub id: PageId,
    /// Type of page
    pub page_type: PageType,
    /// Next page in the free chain, only meaningful for empty pages
    pub next_page_id: PageId,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum PageBody {
    Collection(CollectionPage),
    /// Slotted storage for index nodes and data blocks. Vacant slots are `None`.
    Items(Vec<Option<Vec<u8>>>),
    Empty,
}

/// A database page
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Page {
    /// Page header
    pub header: PageHeader,
    pub body: PageBody,
}

impl Page {
    /// Creates an empty slotted page (index or data).
    pub fn new_slotted(id: PageId, page_type: PageType) -> Self {
        Self {
            header: PageHeader {
                id,
                page_type,
                next_page_id: EMPTY_PAGE_ID,
            },
            body: PageBody::Items(vec![]),
        }
    }

    pub fn new_collection(id: PageId, collection: CollectionPage) -> Self {
        Self {
            header: PageHeader {
                id,
                page_type: PageType::Collection,
                next_page_id: EMPTY_PAGE_ID,
            },
            body: PageBody::Collection(collection),
        }
    }

    /// Creates a free-chain link pointing at `next_page_id`.
    pub fn new_empty(id: PageId, next_page_id: PageId) -> Self {
        Self {
            header: PageHeader {
                id,
                page_type: PageType::Empty,
                next_page_id,
            },
            body: PageBody::Empty,
        }
    }

    pub fn id(&self) -> PageId {
        self.header.id
    }

    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    pub fn expect_type(&self, expected: PageType) -> Result<(), StorageError> {
        if self.header.page_type != expected {
            return Err(StorageError::UnexpectedPageType {
                page_id: self.header.id,
                expected,
                actual: self.header.page_type,
            });
        }
        Ok(())
    }

    fn items(&self) -> Result<&Vec<Option<Vec<u8>>>, StorageError> {
        match &self.body {
            PageBody::Items(items) => Ok(items),
            _ => Err(StorageError::InvalidOperation),
        }
    }

    fn items_mut(&mut self) -> Result<&mut Vec<Option<Vec<u8>>>, StorageError> {
        match &mut self.body {
            PageBody::Items(items) => Ok(items),
            _ => Err(StorageError::InvalidOperation),
        }
    }

    pub fn collection(&self) -> Result<&CollectionPage, StorageError> {
        match &self.body {
            PageBody::Collection(collection) => Ok(collection),
            _ => Err(StorageError::UnexpectedPageType {
                page_id: self.header.id,
                expected: PageType::Collection,
                actual: self.header.page_type,
            }),
        }
    }

    pub fn collection_mut(&mut self) -> Result<&mut CollectionPage, StorageError> {
        let page_id = self.header.id;
        let actual = self.header.page_type;
        match &mut self.body {
            PageBody::Collection(collection) => Ok(collection),
            _ => Err(StorageError::UnexpectedPageType {
                page_id,
                expected: PageType::Collection,
                actual,
            }),
        }
    }

    /// Bytes accounted against [`PAGE_SIZE`].
    pub fn used_bytes(&self) -> usize {
        match &self.body {
            PageBody::Items(items) => {
                PAGE_HEADER_SIZE
                    + items
                        .iter()
                        .map(|item| match item {
                            Some(data) => ITEM_OVERHEAD + data.len(),
                            None => VACANT_SLOT_OVERHEAD,
                        })
                        .sum::<usize>()
            }
            _ => PAGE_HEADER_SIZE,
        }
    }

    pub fn free_bytes(&self) -> usize {
        PAGE_SIZE.saturating_sub(self.used_bytes())
    }

    /// Number of occupied slots.
    pub fn item_count(&self) -> usize {
        match &self.body {
            PageBody::Items(items) => items.iter().filter(|item| item.is_some()).count(),
            _ => 0,
        }
    }

    /// Stores `data` in the first vacant slot (or a new one) and returns the slot index.
    pub fn insert_item(&mut self, data: &[u8]) -> Result<u16, StorageError> {
        let free = self.free_bytes();
        let items = self.items_mut()?;

        match items.iter().position(|item| item.is_none()) {
            Some(slot) => {
                if ITEM_OVERHEAD + data.len() > free + VACANT_SLOT_OVERHEAD {
                    return Err(StorageError::PageFull);
                }
                items[slot] = Some(data.to_vec());
                Ok(slot as u16)
            }
            None => {
                if ITEM_OVERHEAD + data.len() > free || items.len() >= u16::MAX as usize {
                    return Err(StorageError::PageFull);
                }
                items.push(Some(data.to_vec()));
                Ok((items.len() - 1) as u16)
            }
        }
    }

    pub fn item(&self, index: u16) -> Result<&[u8], StorageError> {
        match self.items()?.get(index as usize) {
            Some(Some(data)) => Ok(data),
            _ => Err(StorageError::InvalidOperation),
        }
    }

    /// Replaces the item in slot `index`; fails with `PageFull` if the new bytes do not fit.
    pub fn update_item(&mut self, index: u16, data: &[u8]) -> Result<(), StorageError> {
        let free = self.free_bytes();
        let items = self.items_mut()?;

        let old_len = match items.get(index as usize) {
            Some(Some(old)) => old.len(),
            _ => return Err(StorageError::InvalidOperation),
        };

        if data.len() > old_len + free {
            return Err(StorageError::PageFull);
        }

        items[index as usize] = Some(data.to_vec());
        Ok(())
    }

    /// Vacates slot `index`. Trailing vacant slots are dropped.
    pub fn delete_item(&mut self, index: u16) -> Result<(), StorageError> {
        let items = self.items_mut()?;

        let Some(slot) = items.get_mut(index as usize) else {
            return Err(StorageError::InvalidOperation);
        };
        if slot.take().is_none() {
            return Err(StorageError::InvalidOperation);
        }

        while let Some(None) = items.last() {
            items.pop();
        }

        Ok(())
    }
}
