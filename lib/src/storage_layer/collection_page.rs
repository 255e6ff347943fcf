use bincode::{Decode, Encode};

use super::page::{EMPTY_PAGE_ID, PageAddress, PageId};

/// Slot reserved for the primary-key index.
pub const PRIMARY_SLOT: u8 = 0;
pub const PRIMARY_INDEX_NAME: &str = "_id";
pub const ID_FIELD: &str = "_id";
pub const MAX_INDEXES_PER_COLLECTION: usize = 16;
pub const MAX_INDEX_NAME_LENGTH: usize = 32;
pub const MAX_EXPRESSION_LENGTH: usize = 255;

/// One declared index of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct IndexDescriptor {
    pub slot: u8,
    pub name: String,
    /// Key-extraction expression, opaque to the storage core.
    pub expression: String,
    pub unique: bool,
    /// Head sentinel node (lowest key).
    pub head: PageAddress,
    /// Tail sentinel node (highest key).
    pub tail: PageAddress,
    pub max_level: u8,
}

impl IndexDescriptor {
    pub fn is_primary(&self) -> bool {
        self.slot == PRIMARY_SLOT
    }
}

/// Root metadata of a collection, stored in its own page.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CollectionPage {
    pub name: String,
    /// Index page currently receiving new nodes.
    pub last_index_page_id: PageId,
    /// Data page currently receiving new blocks.
    pub last_data_page_id: PageId,
    pub document_count: u64,
    indexes: Vec<IndexDescriptor>,
}

impl CollectionPage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            last_index_page_id: EMPTY_PAGE_ID,
            last_data_page_id: EMPTY_PAGE_ID,
            document_count: 0,
            indexes: vec![],
        }
    }

    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    pub fn primary_index(&self) -> Option<&IndexDescriptor> {
        self.index_by_slot(PRIMARY_SLOT)
    }

    pub fn secondary_indexes(&self) -> impl Iterator<Item = &IndexDescriptor> {
        self.indexes.iter().filter(|index| !index.is_primary())
    }

    pub fn index_by_slot(&self, slot: u8) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|index| index.slot == slot)
    }

    pub fn index_by_name(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes
            .iter()
            .find(|index| index.name.eq_ignore_ascii_case(name))
    }

    /// Lowest slot not yet taken, if the collection still has room for an index.
    pub fn next_free_slot(&self) -> Option<u8> {
        (0..MAX_INDEXES_PER_COLLECTION as u8).find(|slot| self.index_by_slot(*slot).is_none())
    }

    pub fn add_index(&mut self, index: IndexDescriptor) {
        self.indexes.push(index);
    }
}
