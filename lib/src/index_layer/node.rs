use bincode::{Decode, Encode};

use super::super::storage_layer::page::PageAddress;
use super::key::IndexKey;

/// Entry of a skip-list index.
///
/// `prev`/`next` hold one link per level. `prev_node`/`next_node` chain every
/// node that indexes the same document, starting at its primary-key node.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct IndexNode {
    pub position: PageAddress,
    pub slot: u8,
    pub key: IndexKey,
    pub data_block: PageAddress,
    pub prev: Vec<PageAddress>,
    pub next: Vec<PageAddress>,
    pub prev_node: PageAddress,
    pub next_node: PageAddress,
}

impl IndexNode {
    pub fn new(slot: u8, key: IndexKey, levels: u8) -> Self {
        Self {
            position: PageAddress::EMPTY,
            slot,
            key,
            data_block: PageAddress::EMPTY,
            prev: vec![PageAddress::EMPTY; levels as usize],
            next: vec![PageAddress::EMPTY; levels as usize],
            prev_node: PageAddress::EMPTY,
            next_node: PageAddress::EMPTY,
        }
    }

    pub fn levels(&self) -> usize {
        self.next.len()
    }
}
