use tracing::info;

use super::super::index_layer::index_engine::{IndexEngine, Order};
use super::super::index_layer::key::IndexKey;
use super::super::storage_layer::collection_page::{
    CollectionPage, IndexDescriptor, MAX_EXPRESSION_LENGTH, MAX_INDEX_NAME_LENGTH,
    PRIMARY_INDEX_NAME, PRIMARY_SLOT,
};
use super::super::storage_layer::data_store::DataStore;
use super::super::storage_layer::header::validate_collection_name;
use super::super::storage_layer::page::{PageAddress, PageId};
use super::super::transaction_layer::transaction::Transaction;
use super::document::{Document, DocumentCodec, KeyExtractorFactory};
use super::error::ExecutorError;

pub const PRIMARY_EXPRESSION: &str = "$._id";

/// A collection's metadata page loaded into a transaction.
#[derive(Debug, Clone)]
pub struct Collection {
    pub page_id: PageId,
    pub page: CollectionPage,
}

impl Collection {
    /// The collection named `name`, or `None` if it does not exist.
    pub fn load(tx: &mut Transaction, name: &str) -> Result<Option<Self>, ExecutorError> {
        let Some(page_id) = tx.pages().buffer_pool().collection_page_id(name) else {
            return Ok(None);
        };
        let page = tx.pages().read_collection(page_id)?;
        Ok(Some(Self { page_id, page }))
    }

    /// Loads `name`, creating it with its primary-key index on first use.
    pub fn get_or_create(
        tx: &mut Transaction,
        name: &str,
        max_level: u8,
    ) -> Result<Self, ExecutorError> {
        if validate_collection_name(name).is_err() {
            return Err(ExecutorError::InvalidCollectionName(name.to_owned()));
        }
        if let Some(collection) = Self::load(tx, name)? {
            return Ok(collection);
        }

        let page_id = tx.pages().buffer_pool_mut().allocate_collection(name)?;
        tx.pages().buffer_pool_mut().stage_collection(name, page_id);

        let mut page = tx.pages().read_collection(page_id)?;
        IndexEngine::new(tx.pages()).create_index(
            &mut page,
            PRIMARY_SLOT,
            PRIMARY_INDEX_NAME,
            PRIMARY_EXPRESSION,
            true,
            max_level,
        )?;

        let collection = Self { page_id, page };
        collection.save(tx)?;
        info!(collection = name, page_id, "created collection");
        Ok(collection)
    }

    pub fn save(&self, tx: &mut Transaction) -> Result<(), ExecutorError> {
        tx.pages().write_collection(self.page_id, &self.page)?;
        Ok(())
    }

    fn primary(&self) -> Result<IndexDescriptor, ExecutorError> {
        self.index(PRIMARY_INDEX_NAME)
    }

    pub fn index(&self, name: &str) -> Result<IndexDescriptor, ExecutorError> {
        self.page
            .index_by_name(name)
            .cloned()
            .ok_or_else(|| ExecutorError::IndexNotFound(name.to_owned()))
    }

    /// Position of the document with identity `id`.
    pub fn locate(
        &self,
        tx: &mut Transaction,
        id: &IndexKey,
    ) -> Result<Option<PageAddress>, ExecutorError> {
        let primary = self.primary()?;
        let node = IndexEngine::new(tx.pages()).find(&primary, id, false, Order::Ascending)?;
        Ok(node.map(|node| node.data_block))
    }

    pub fn read_document(
        tx: &mut Transaction,
        codec: &dyn DocumentCodec,
        position: PageAddress,
    ) -> Result<Document, ExecutorError> {
        let data = DataStore::read(tx.pages(), position)?;
        codec.decode(&data)
    }

    /// Documents whose `index` key equals `key`, in index order.
    pub fn find_by_index(
        &self,
        tx: &mut Transaction,
        codec: &dyn DocumentCodec,
        index: &str,
        key: &IndexKey,
    ) -> Result<Vec<Document>, ExecutorError> {
        let index = self.index(index)?;
        let nodes = IndexEngine::new(tx.pages()).find_all(&index, key)?;
        nodes
            .iter()
            .map(|node| Self::read_document(tx, codec, node.data_block))
            .collect()
    }

    /// Every document in the order of `index`.
    pub fn scan(
        &self,
        tx: &mut Transaction,
        codec: &dyn DocumentCodec,
        index: &str,
        order: Order,
    ) -> Result<Vec<Document>, ExecutorError> {
        let index = self.index(index)?;
        let nodes = IndexEngine::new(tx.pages()).find_all_ordered(&index, order)?;
        nodes
            .iter()
            .map(|node| Self::read_document(tx, codec, node.data_block))
            .collect()
    }

    /// Removes the document with identity `id` and all of its index nodes.
    pub fn delete(&mut self, tx: &mut Transaction, id: &IndexKey) -> Result<bool, ExecutorError> {
        let primary = self.primary()?;
        let mut engine = IndexEngine::new(tx.pages());
        let Some(pk) = engine.find(&primary, id, false, Order::Ascending)? else {
            return Ok(false);
        };

        engine.delete_document(&self.page, &pk)?;
        DataStore::delete(tx.pages(), &mut self.page, pk.data_block)?;
        self.page.document_count = self.page.document_count.saturating_sub(1);
        Ok(true)
    }

    /// Declares a secondary index and fills it from the stored documents.
    /// Returns false if an identical index already exists.
    #[allow(clippy::too_many_arguments)]
    pub fn ensure_index(
        &mut self,
        tx: &mut Transaction,
        codec: &dyn DocumentCodec,
        factory: &dyn KeyExtractorFactory,
        name: &str,
        expression: &str,
        unique: bool,
        max_level: u8,
    ) -> Result<bool, ExecutorError> {
        if name.is_empty()
            || name.len() > MAX_INDEX_NAME_LENGTH
            || name.starts_with('$')
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ExecutorError::InvalidExpression(format!(
                "invalid index name {:?}",
                name
            )));
        }
        if expression.len() > MAX_EXPRESSION_LENGTH {
            return Err(ExecutorError::InvalidExpression(expression.to_owned()));
        }

        if let Some(existing) = self.page.index_by_name(name) {
            if existing.expression == expression && existing.unique == unique {
                return Ok(false);
            }
            return Err(ExecutorError::IndexAlreadyExists(name.to_owned()));
        }

        let extractor = factory.create(expression)?;
        let slot = self
            .page
            .next_free_slot()
            .ok_or(ExecutorError::TooManyIndexes)?;
        let primary = self.primary()?;

        let mut engine = IndexEngine::new(tx.pages());
        let index = engine.create_index(&mut self.page, slot, name, expression, unique, max_level)?;

        let documents = engine.find_all_ordered(&primary, Order::Ascending)?;
        for pk in documents {
            let data = DataStore::read(tx.pages(), pk.data_block)?;
            let document = codec.decode(&data)?;

            let mut engine = IndexEngine::new(tx.pages());
            for key in distinct(extractor.extract(&document)) {
                let node = engine.add_node(&mut self.page, &index, key, Some(pk.position))?;
                engine.set_data_block(node.position, pk.data_block)?;
            }
        }

        info!(collection = %self.page.name, index = name, slot, unique, "created index");
        Ok(true)
    }
}

/// Drops repeated keys, keeping the first occurrence.
pub fn distinct(keys: Vec<IndexKey>) -> Vec<IndexKey> {
    let mut unique: Vec<IndexKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if !unique.contains(&key) {
            unique.push(key);
        }
    }
    unique
}
