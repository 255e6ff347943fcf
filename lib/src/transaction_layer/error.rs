use super::super::index_layer::error::IndexError;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Timed out after {waited:?} waiting for the write lock on {collection}")]
    LockTimeout { collection: String, waited: Duration },

    #[error("Underlying index error: {0}")]
    IndexError(IndexError),
}

impl<T: Into<IndexError>> From<T> for TransactionError {
    fn from(item: T) -> Self {
        let index_err: IndexError = item.into();
        Self::IndexError(index_err)
    }
}
