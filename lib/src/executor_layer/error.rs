use super::super::index_layer::error::IndexError;
use super::super::storage_layer::error::StorageError;
use super::super::transaction_layer::error::TransactionError;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Invalid value {value} for field {field}")]
    InvalidDataType { field: String, value: Value },

    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    #[error("Invalid index expression: {0}")]
    InvalidExpression(String),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Too many indexes")]
    TooManyIndexes,

    #[error("Document codec error: {0}")]
    Codec(String),

    #[error("Underlying error: {0}")]
    TransactionError(TransactionError),
}

impl<T: Into<TransactionError>> From<T> for ExecutorError {
    fn from(item: T) -> Self {
        let transaction_err: TransactionError = item.into();
        Self::TransactionError(transaction_err)
    }
}

impl ExecutorError {
    fn index_error(&self) -> Option<&IndexError> {
        match self {
            ExecutorError::TransactionError(TransactionError::IndexError(e)) => Some(e),
            _ => None,
        }
    }

    fn storage_error(&self) -> Option<&StorageError> {
        match self.index_error() {
            Some(IndexError::StorageError(e)) => Some(e),
            _ => None,
        }
    }

    /// The file is not a database this engine can open.
    pub fn is_format_error(&self) -> bool {
        self.storage_error()
            .is_some_and(|e| e.is_format_error())
    }

    /// An invariant of the stored structure was violated.
    pub fn is_structural_error(&self) -> bool {
        matches!(
            self.index_error(),
            Some(IndexError::DuplicateKey { .. } | IndexError::CorruptIndex(_))
        )
    }

    /// The caller handed in a value the engine refuses to store.
    pub fn is_validation_error(&self) -> bool {
        match self {
            ExecutorError::InvalidDataType { .. }
            | ExecutorError::InvalidCollectionName(_)
            | ExecutorError::InvalidExpression(_) => true,
            _ => matches!(self.index_error(), Some(IndexError::InvalidIndexKey(_))),
        }
    }

    pub fn is_concurrency_error(&self) -> bool {
        matches!(
            self,
            ExecutorError::TransactionError(TransactionError::LockTimeout { .. })
        )
    }
}
