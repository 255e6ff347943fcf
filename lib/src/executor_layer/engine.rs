use std::sync::Arc;

use tracing::{info, warn};

use super::super::config::EngineConfig;
use super::super::index_layer::index_engine::Order;
use super::super::index_layer::key::IndexKey;
use super::super::storage_layer::header::HeaderPage;
use super::super::storage_layer::storage::Storage;
use super::super::transaction_layer::lock_manager::LockManager;
use super::super::transaction_layer::transaction::Transaction;
use super::collection::Collection;
use super::document::{Document, DocumentCodec, FieldPathFactory, JsonCodec, KeyExtractorFactory};
use super::error::ExecutorError;
use super::update::{UpdateCoordinator, UpdateOutcome};

/// Entry point of the storage core.
///
/// Every operation runs in its own transaction holding the write lock of the
/// collection it touches. An error rolls the whole operation back.
pub struct Engine {
    storage: Arc<Storage>,
    locks: Arc<LockManager>,
    config: EngineConfig,
    codec: Arc<dyn DocumentCodec>,
    extractors: Arc<dyn KeyExtractorFactory>,
}

impl Engine {
    /// Opens the database at `config.path`, creating it if the store is empty.
    pub fn open(config: EngineConfig) -> Result<Self, ExecutorError> {
        let storage = Storage::open(&config.path, config.user_version, config.salt)?;
        Ok(Self {
            storage: Arc::new(storage),
            locks: Arc::new(LockManager::new()),
            config,
            codec: Arc::new(JsonCodec),
            extractors: Arc::new(FieldPathFactory),
        })
    }

    pub fn with_codec<C: DocumentCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_extractors<F: KeyExtractorFactory + 'static>(mut self, factory: F) -> Self {
        self.extractors = Arc::new(factory);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn begin(&self) -> Transaction {
        Transaction::begin(
            self.storage.clone(),
            self.locks.clone(),
            self.config.lock_timeout,
        )
    }

    fn check_name(collection: &str) -> Result<(), ExecutorError> {
        if collection.trim().is_empty() {
            return Err(ExecutorError::InvalidCollectionName(collection.to_owned()));
        }
        Ok(())
    }

    //runs `body` under the collection's write lock, commit on success, rollback otherwise
    fn run<T>(
        &self,
        collection: &str,
        body: impl FnOnce(&mut Transaction) -> Result<T, ExecutorError>,
    ) -> Result<T, ExecutorError> {
        Self::check_name(collection)?;
        let mut tx = self.begin();
        tx.write_lock(collection)?;

        match body(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Replaces stored documents by identity. Returns how many matched; a
    /// missing collection matches nothing.
    pub fn update(&self, collection: &str, documents: &[Document]) -> Result<usize, ExecutorError> {
        let outcomes = self.update_outcomes(collection, documents)?;
        Ok(outcomes.iter().filter(|outcome| outcome.is_updated()).count())
    }

    /// Like [`Engine::update`], with the outcome of every document.
    pub fn update_outcomes(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<Vec<UpdateOutcome>, ExecutorError> {
        let outcomes = self.run(collection, |tx| {
            let Some(mut target) = Collection::load(tx, collection)? else {
                return Ok(vec![UpdateOutcome::NotFound; documents.len()]);
            };
            let before = target.page.clone();

            let coordinator =
                UpdateCoordinator::new(self.codec.as_ref(), self.extractors.as_ref(), &target.page)?;
            let mut outcomes = Vec::with_capacity(documents.len());
            for document in documents {
                outcomes.push(coordinator.update(tx, &mut target.page, document)?);
            }

            if target.page != before {
                target.save(tx)?;
            }
            Ok(outcomes)
        })?;

        info!(
            collection,
            documents = documents.len(),
            updated = outcomes.iter().filter(|outcome| outcome.is_updated()).count(),
            "update finished"
        );
        Ok(outcomes)
    }

    /// Stores new documents, creating the collection on first use.
    pub fn insert(&self, collection: &str, documents: &[Document]) -> Result<usize, ExecutorError> {
        self.run(collection, |tx| {
            let mut target = Collection::get_or_create(tx, collection, self.config.max_index_levels)?;
            let coordinator =
                UpdateCoordinator::new(self.codec.as_ref(), self.extractors.as_ref(), &target.page)?;
            for document in documents {
                coordinator.insert(tx, &mut target.page, document)?;
            }
            target.save(tx)?;
            Ok(documents.len())
        })
    }

    /// Removes documents by identity. Returns how many existed.
    pub fn delete(&self, collection: &str, ids: &[IndexKey]) -> Result<usize, ExecutorError> {
        self.run(collection, |tx| {
            let Some(mut target) = Collection::load(tx, collection)? else {
                return Ok(0);
            };

            let mut deleted = 0;
            for id in ids {
                if target.delete(tx, id)? {
                    deleted += 1;
                }
            }
            if deleted > 0 {
                target.save(tx)?;
            }
            Ok(deleted)
        })
    }

    /// Declares a secondary index on `collection` and fills it. Returns
    /// false if the same index already exists.
    pub fn ensure_index(
        &self,
        collection: &str,
        name: &str,
        expression: &str,
        unique: bool,
    ) -> Result<bool, ExecutorError> {
        self.run(collection, |tx| {
            let mut target = Collection::get_or_create(tx, collection, self.config.max_index_levels)?;
            let created = target.ensure_index(
                tx,
                self.codec.as_ref(),
                self.extractors.as_ref(),
                name,
                expression,
                unique,
                self.config.max_index_levels,
            )?;
            if created {
                target.save(tx)?;
            }
            Ok(created)
        })
    }

    pub fn find_by_id(
        &self,
        collection: &str,
        id: &IndexKey,
    ) -> Result<Option<Document>, ExecutorError> {
        self.run(collection, |tx| {
            let Some(target) = Collection::load(tx, collection)? else {
                return Ok(None);
            };
            match target.locate(tx, id)? {
                Some(position) => Ok(Some(Collection::read_document(
                    tx,
                    self.codec.as_ref(),
                    position,
                )?)),
                None => Ok(None),
            }
        })
    }

    /// Documents whose key in `index` equals `key`.
    pub fn find_by_index(
        &self,
        collection: &str,
        index: &str,
        key: &IndexKey,
    ) -> Result<Vec<Document>, ExecutorError> {
        self.run(collection, |tx| match Collection::load(tx, collection)? {
            Some(target) => target.find_by_index(tx, self.codec.as_ref(), index, key),
            None => Ok(vec![]),
        })
    }

    /// Every document of `collection` in the order of `index`.
    pub fn scan_index(
        &self,
        collection: &str,
        index: &str,
        order: Order,
    ) -> Result<Vec<Document>, ExecutorError> {
        self.run(collection, |tx| match Collection::load(tx, collection)? {
            Some(target) => target.scan(tx, self.codec.as_ref(), index, order),
            None => Ok(vec![]),
        })
    }

    pub fn count(&self, collection: &str) -> Result<u64, ExecutorError> {
        self.run(collection, |tx| {
            Ok(Collection::load(tx, collection)?
                .map(|target| target.page.document_count)
                .unwrap_or(0))
        })
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.storage
            .header()
            .collections
            .iter()
            .map(|(name, _)| name.to_owned())
            .collect()
    }

    pub fn user_version(&self) -> u16 {
        self.storage.header().user_version
    }

    pub fn set_user_version(&self, user_version: u16) -> Result<(), ExecutorError> {
        let mut tx = self.begin();
        tx.pages().buffer_pool_mut().stage_user_version(user_version);
        tx.commit()?;
        Ok(())
    }

    /// Snapshot of the committed header.
    pub fn header(&self) -> HeaderPage {
        self.storage.header()
    }

    /// Compacts the underlying page store.
    pub fn maintenance(&self) -> Result<usize, ExecutorError> {
        Ok(self.storage.maintenance()?)
    }
}
