use super::super::storage_layer::error::StorageError;
use super::key::IndexKey;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Duplicate key {key} in unique index {index}")]
    DuplicateKey { index: String, key: IndexKey },

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Invalid index key: {0}")]
    InvalidIndexKey(String),

    #[error("Underlying storage error: {0}")]
    StorageError(StorageError),
}

impl<T: Into<StorageError>> From<T> for IndexError {
    fn from(item: T) -> Self {
        let storage_err: StorageError = item.into();
        Self::StorageError(storage_err)
    }
}
