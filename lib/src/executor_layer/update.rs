//! Keeps a document's data block and index nodes consistent on write.

use tracing::debug;

use super::super::index_layer::error::IndexError;
use super::super::index_layer::index_engine::{IndexEngine, Order};
use super::super::index_layer::key::IndexKey;
use super::super::index_layer::node::IndexNode;
use super::super::storage_layer::collection_page::{CollectionPage, IndexDescriptor};
use super::super::storage_layer::data_store::DataStore;
use super::super::storage_layer::page::PageAddress;
use super::super::transaction_layer::transaction::Transaction;
use super::collection::distinct;
use super::document::{Document, DocumentCodec, KeyExtractor, KeyExtractorFactory, document_id};
use super::error::ExecutorError;

/// Result of updating one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No stored document has this identity.
    NotFound,
    Updated {
        /// Index nodes removed because their key is gone.
        deleted: usize,
        /// Index nodes added for new keys.
        inserted: usize,
        /// The data block moved to a new position.
        relocated: bool,
    },
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated { .. })
    }
}

pub struct UpdateCoordinator<'a> {
    codec: &'a dyn DocumentCodec,
    primary: IndexDescriptor,
    secondary: Vec<(IndexDescriptor, Box<dyn KeyExtractor>)>,
}

impl<'a> UpdateCoordinator<'a> {
    /// Prepares one extractor per secondary index of `collection`.
    pub fn new(
        codec: &'a dyn DocumentCodec,
        factory: &dyn KeyExtractorFactory,
        collection: &CollectionPage,
    ) -> Result<Self, ExecutorError> {
        let primary = collection.primary_index().cloned().ok_or_else(|| {
            IndexError::CorruptIndex(format!("collection {} has no primary key index", collection.name))
        })?;

        let mut secondary = vec![];
        for index in collection.secondary_indexes() {
            secondary.push((index.clone(), factory.create(&index.expression)?));
        }

        Ok(Self {
            codec,
            primary,
            secondary,
        })
    }

    /// Stores a new document and indexes it. A repeated identity fails with
    /// a duplicate key error.
    pub fn insert(
        &self,
        tx: &mut Transaction,
        collection: &mut CollectionPage,
        document: &Document,
    ) -> Result<PageAddress, ExecutorError> {
        let id = document_id(document)?;
        let data = self.codec.encode(document)?;

        let mut engine = IndexEngine::new(tx.pages());
        let pk = engine.add_node(collection, &self.primary, id, None)?;

        let position = DataStore::insert(tx.pages(), collection, &data)?;

        let mut engine = IndexEngine::new(tx.pages());
        engine.set_data_block(pk.position, position)?;
        for (index, extractor) in self.secondary.iter() {
            for key in distinct(extractor.extract(document)) {
                let node = engine.add_node(collection, index, key, Some(pk.position))?;
                engine.set_data_block(node.position, position)?;
            }
        }

        collection.document_count += 1;
        Ok(position)
    }

    /// Rewrites a stored document and patches its secondary index nodes.
    ///
    /// Only keys that changed are touched: nodes whose key is gone are
    /// deleted first, then nodes for new keys are added. The primary-key
    /// node is never replaced. A document with an invalid identity fails
    /// before anything is written.
    pub fn update(
        &self,
        tx: &mut Transaction,
        collection: &mut CollectionPage,
        document: &Document,
    ) -> Result<UpdateOutcome, ExecutorError> {
        let id = document_id(document)?;

        let pk = IndexEngine::new(tx.pages()).find(&self.primary, &id, false, Order::Ascending)?;
        let Some(pk) = pk else {
            debug!(collection = %collection.name, id = %id, "document not found");
            return Ok(UpdateOutcome::NotFound);
        };

        let data = self.codec.encode(document)?;
        let position = DataStore::update(tx.pages(), collection, pk.data_block, &data)?;
        let relocated = position != pk.data_block;

        let mut engine = IndexEngine::new(tx.pages());
        let mut nodes = engine.get_node_list(&pk, true)?;
        if relocated {
            for node in nodes.iter_mut() {
                *node = engine.set_data_block(node.position, position)?;
            }
        }

        let mut deleted = 0;
        let mut inserted = 0;
        for (index, extractor) in self.secondary.iter() {
            let keys = distinct(extractor.extract(document));
            let existing: Vec<&IndexNode> =
                nodes.iter().filter(|node| node.slot == index.slot).collect();

            let stale: Vec<PageAddress> = existing
                .iter()
                .filter(|node| !keys.contains(&node.key))
                .map(|node| node.position)
                .collect();
            let fresh: Vec<IndexKey> = keys
                .into_iter()
                .filter(|key| !existing.iter().any(|node| node.key == *key))
                .collect();

            for node in stale {
                engine.delete(collection, index, node)?;
                deleted += 1;
            }
            for key in fresh {
                let node = engine.add_node(collection, index, key, Some(pk.position))?;
                engine.set_data_block(node.position, position)?;
                inserted += 1;
            }
        }

        debug!(
            collection = %collection.name,
            id = %id,
            deleted,
            inserted,
            relocated,
            "updated document"
        );
        Ok(UpdateOutcome::Updated {
            deleted,
            inserted,
            relocated,
        })
    }
}
