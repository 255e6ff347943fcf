//! Skip-list index stored in index pages.
//!
//! Every index owns two sentinel nodes: a head keyed `MinValue` and a tail
//! keyed `MaxValue`, both with `max_level` levels. Regular nodes get a random
//! height and sit between them in key order; equal keys keep insertion order.

use std::collections::HashSet;

use rand::Rng;
use tracing::debug;

use super::super::config::MAX_LEVEL_LIMIT;
use super::super::storage_layer::collection_page::{CollectionPage, IndexDescriptor, PRIMARY_SLOT};
use super::super::storage_layer::error::StorageError;
use super::super::storage_layer::page::{EMPTY_PAGE_ID, PageAddress, PageType};
use super::super::storage_layer::paged_storage::PagedStorage;
use super::super::storage_layer::utils::encode;
use super::error::IndexError;
use super::key::IndexKey;
use super::node::IndexNode;

/// Largest encoded key an index accepts.
pub const MAX_INDEX_KEY_LENGTH: usize = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

pub struct IndexEngine<'a> {
    storage: &'a mut PagedStorage,
}

impl<'a> IndexEngine<'a> {
    pub fn new(storage: &'a mut PagedStorage) -> Self {
        Self { storage }
    }

    pub fn read_node(&mut self, position: PageAddress) -> Result<IndexNode, IndexError> {
        let node: IndexNode = self.storage.read(position, PageType::Index)?;
        if node.position != position {
            return Err(IndexError::CorruptIndex(format!(
                "node stored at {} claims position {}",
                position, node.position
            )));
        }
        Ok(node)
    }

    fn write_node(&mut self, node: &IndexNode) -> Result<(), IndexError> {
        self.storage.write(node.position, PageType::Index, node)?;
        Ok(())
    }

    //gives the node a slot in the collection's current index page, or a fresh one
    fn store_node(
        &mut self,
        collection: &mut CollectionPage,
        node: &mut IndexNode,
    ) -> Result<(), IndexError> {
        let encoded = encode(node)?;

        let mut position = None;
        if collection.last_index_page_id != EMPTY_PAGE_ID {
            match self.storage.insert_data(
                collection.last_index_page_id,
                PageType::Index,
                &encoded,
            ) {
                Ok(address) => position = Some(address),
                Err(StorageError::PageFull) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let position = match position {
            Some(address) => address,
            None => {
                let page_id = self.storage.allocate_page(PageType::Index)?;
                collection.last_index_page_id = page_id;
                self.storage.insert_data(page_id, PageType::Index, &encoded)?
            }
        };

        node.position = position;
        self.write_node(node)
    }

    fn remove_node(
        &mut self,
        collection: &CollectionPage,
        position: PageAddress,
    ) -> Result<(), IndexError> {
        let page_empty = self.storage.cut_data(position, PageType::Index)?;
        if page_empty && position.page_id != collection.last_index_page_id {
            self.storage.delete_page(position.page_id);
        }
        Ok(())
    }

    /// Allocates the sentinels of a new index and registers it on `collection`.
    pub fn create_index(
        &mut self,
        collection: &mut CollectionPage,
        slot: u8,
        name: &str,
        expression: &str,
        unique: bool,
        max_level: u8,
    ) -> Result<IndexDescriptor, IndexError> {
        if collection.index_by_slot(slot).is_some() {
            return Err(IndexError::CorruptIndex(format!(
                "slot {} of {} is already in use",
                slot, collection.name
            )));
        }

        let levels = max_level.clamp(1, MAX_LEVEL_LIMIT);
        let mut head = IndexNode::new(slot, IndexKey::MinValue, levels);
        let mut tail = IndexNode::new(slot, IndexKey::MaxValue, levels);
        self.store_node(collection, &mut head)?;
        self.store_node(collection, &mut tail)?;

        head.next = vec![tail.position; levels as usize];
        tail.prev = vec![head.position; levels as usize];
        self.write_node(&head)?;
        self.write_node(&tail)?;

        let index = IndexDescriptor {
            slot,
            name: name.to_owned(),
            expression: expression.to_owned(),
            unique,
            head: head.position,
            tail: tail.position,
            max_level: levels,
        };
        collection.add_index(index.clone());

        debug!(collection = %collection.name, index = name, slot, "created index");
        Ok(index)
    }

    fn flip(max_level: u8) -> u8 {
        let mut rng = rand::thread_rng();
        let mut levels = 1u8;
        while levels < max_level && rng.gen_bool(0.5) {
            levels += 1;
        }
        levels
    }

    /// Inserts a node for `key`. When `primary` is given the node joins the
    /// chain of nodes that index the same document as that primary-key node.
    /// The caller attaches the data block with [`IndexEngine::set_data_block`].
    pub fn add_node(
        &mut self,
        collection: &mut CollectionPage,
        index: &IndexDescriptor,
        key: IndexKey,
        primary: Option<PageAddress>,
    ) -> Result<IndexNode, IndexError> {
        if key.is_sentinel() {
            return Err(IndexError::InvalidIndexKey(format!(
                "{} is reserved for index boundaries",
                key
            )));
        }

        let key_length = encode(&key)?.len();
        if key_length > MAX_INDEX_KEY_LENGTH {
            return Err(IndexError::InvalidIndexKey(format!(
                "key is {} bytes, limit is {}",
                key_length, MAX_INDEX_KEY_LENGTH
            )));
        }

        if index.unique && self.find(index, &key, false, Order::Ascending)?.is_some() {
            return Err(IndexError::DuplicateKey {
                index: index.name.clone(),
                key,
            });
        }

        let levels = Self::flip(index.max_level);
        let mut node = IndexNode::new(index.slot, key, levels);
        self.store_node(collection, &mut node)?;

        let mut cur = self.read_node(index.head)?;
        for level in (0..index.max_level as usize).rev() {
            loop {
                let next_position = cur.next[level];
                if next_position == index.tail {
                    break;
                }
                let next = self.read_node(next_position)?;
                //equal keys stay in front of the new node
                if next.key > node.key {
                    break;
                }
                cur = next;
            }

            if level < levels as usize {
                let next_position = cur.next[level];
                node.prev[level] = cur.position;
                node.next[level] = next_position;

                cur.next[level] = node.position;
                self.write_node(&cur)?;

                let mut next = self.read_node(next_position)?;
                next.prev[level] = node.position;
                self.write_node(&next)?;
            }
        }

        if let Some(primary) = primary {
            let mut primary_node = self.read_node(primary)?;
            node.prev_node = primary_node.position;
            node.next_node = primary_node.next_node;

            if !primary_node.next_node.is_empty() {
                let mut after = self.read_node(primary_node.next_node)?;
                after.prev_node = node.position;
                self.write_node(&after)?;
            }

            primary_node.next_node = node.position;
            self.write_node(&primary_node)?;
        }

        self.write_node(&node)?;
        Ok(node)
    }

    pub fn set_data_block(
        &mut self,
        position: PageAddress,
        data_block: PageAddress,
    ) -> Result<IndexNode, IndexError> {
        let mut node = self.read_node(position)?;
        node.data_block = data_block;
        self.write_node(&node)?;
        Ok(node)
    }

    /// Locates `key`. With `sibling == false` only an exact match is returned;
    /// with `sibling == true` a missing key yields the nearest node in `order`.
    /// Among equal keys the first one in `order` wins.
    pub fn find(
        &mut self,
        index: &IndexDescriptor,
        key: &IndexKey,
        sibling: bool,
        order: Order,
    ) -> Result<Option<IndexNode>, IndexError> {
        let (start, end) = match order {
            Order::Ascending => (index.head, index.tail),
            Order::Descending => (index.tail, index.head),
        };
        let ahead = |node: &IndexNode, level: usize| match order {
            Order::Ascending => node.next[level],
            Order::Descending => node.prev[level],
        };
        let passed = |candidate: &IndexKey| match order {
            Order::Ascending => candidate < key,
            Order::Descending => candidate > key,
        };

        let mut cur = self.read_node(start)?;
        for level in (0..cur.levels()).rev() {
            loop {
                let next_position = ahead(&cur, level);
                if next_position == end {
                    break;
                }
                let next = self.read_node(next_position)?;
                if !passed(&next.key) {
                    break;
                }
                cur = next;
            }
        }

        let candidate_position = ahead(&cur, 0);
        if candidate_position == end {
            return Ok(None);
        }

        let candidate = self.read_node(candidate_position)?;
        if candidate.key == *key || sibling {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }

    /// Every node holding `key`, in insertion order.
    pub fn find_all(
        &mut self,
        index: &IndexDescriptor,
        key: &IndexKey,
    ) -> Result<Vec<IndexNode>, IndexError> {
        let mut nodes = vec![];
        let mut current = self.find(index, key, false, Order::Ascending)?;

        while let Some(node) = current {
            let next_position = node.next[0];
            nodes.push(node);
            if next_position == index.tail {
                break;
            }
            let next = self.read_node(next_position)?;
            current = if next.key == *key { Some(next) } else { None };
        }

        Ok(nodes)
    }

    /// Every node of the index in `order`, sentinels excluded.
    pub fn find_all_ordered(
        &mut self,
        index: &IndexDescriptor,
        order: Order,
    ) -> Result<Vec<IndexNode>, IndexError> {
        let (start, end) = match order {
            Order::Ascending => (index.head, index.tail),
            Order::Descending => (index.tail, index.head),
        };

        let mut nodes = vec![];
        let mut cur = self.read_node(start)?;
        loop {
            let next_position = match order {
                Order::Ascending => cur.next[0],
                Order::Descending => cur.prev[0],
            };
            if next_position == end {
                break;
            }
            cur = self.read_node(next_position)?;
            nodes.push(cur.clone());
        }

        Ok(nodes)
    }

    /// Every node, across all slots, that indexes the same document as `start`.
    pub fn get_node_list(
        &mut self,
        start: &IndexNode,
        include_primary: bool,
    ) -> Result<Vec<IndexNode>, IndexError> {
        let mut visited = HashSet::new();
        visited.insert(start.position);

        let mut first = start.clone();
        while !first.prev_node.is_empty() {
            if !visited.insert(first.prev_node) {
                return Err(IndexError::CorruptIndex(format!(
                    "node chain of {} loops",
                    start.position
                )));
            }
            first = self.read_node(first.prev_node)?;
        }

        visited.clear();
        let mut nodes = vec![];
        let mut current = Some(first);
        while let Some(node) = current {
            if !visited.insert(node.position) {
                return Err(IndexError::CorruptIndex(format!(
                    "node chain of {} loops",
                    start.position
                )));
            }
            if node.data_block != start.data_block {
                return Err(IndexError::CorruptIndex(format!(
                    "node {} points at {} but its chain points at {}",
                    node.position, node.data_block, start.data_block
                )));
            }

            let next_position = node.next_node;
            if include_primary || node.slot != PRIMARY_SLOT {
                nodes.push(node);
            }
            current = if next_position.is_empty() {
                None
            } else {
                Some(self.read_node(next_position)?)
            };
        }

        Ok(nodes)
    }

    /// Unlinks the node at `position` from its index and its document chain.
    pub fn delete(
        &mut self,
        collection: &CollectionPage,
        index: &IndexDescriptor,
        position: PageAddress,
    ) -> Result<(), IndexError> {
        if position == index.head || position == index.tail {
            return Err(IndexError::CorruptIndex(format!(
                "sentinel {} of index {} cannot be deleted",
                position, index.name
            )));
        }

        let node = self.read_node(position)?;
        if node.slot != index.slot {
            return Err(IndexError::CorruptIndex(format!(
                "node {} belongs to slot {}, not {}",
                position, node.slot, index.slot
            )));
        }

        for level in 0..node.levels() {
            let mut prev = self.read_node(node.prev[level])?;
            prev.next[level] = node.next[level];
            self.write_node(&prev)?;

            let mut next = self.read_node(node.next[level])?;
            next.prev[level] = node.prev[level];
            self.write_node(&next)?;
        }

        if !node.prev_node.is_empty() {
            let mut prev = self.read_node(node.prev_node)?;
            prev.next_node = node.next_node;
            self.write_node(&prev)?;
        }
        if !node.next_node.is_empty() {
            let mut next = self.read_node(node.next_node)?;
            next.prev_node = node.prev_node;
            self.write_node(&next)?;
        }

        self.remove_node(collection, position)
    }

    /// Removes every index node of the document whose primary-key node is `primary`.
    pub fn delete_document(
        &mut self,
        collection: &CollectionPage,
        primary: &IndexNode,
    ) -> Result<usize, IndexError> {
        let nodes = self.get_node_list(primary, true)?;
        for node in nodes.iter() {
            let index = collection.index_by_slot(node.slot).ok_or_else(|| {
                IndexError::CorruptIndex(format!(
                    "node {} uses undeclared slot {}",
                    node.position, node.slot
                ))
            })?;
            self.delete(collection, index, node.position)?;
        }
        Ok(nodes.len())
    }
}
