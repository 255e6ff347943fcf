use super::page::{PageId, PageType};

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    EncodeError(#[from] EncodeError),

    #[error("Deserialization error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Page full")]
    PageFull,

    #[error("Invalid operation")]
    InvalidOperation,

    #[error("Page {page_id} is a {actual} page, expected {expected}")]
    UnexpectedPageType {
        page_id: PageId,
        expected: PageType,
        actual: PageType,
    },

    #[error("File is not a valid database")]
    InvalidDatabase,

    #[error("Unsupported database version: {0}")]
    InvalidDatabaseVersion(u8),

    #[error("Header page is truncated")]
    TruncatedHeader,

    #[error("Header page is corrupt: {0}")]
    CorruptHeader(String),

    #[error("Too many collections")]
    TooManyCollections,

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("IO error")]
    IOError(#[from] std::io::Error),
}

impl StorageError {
    /// True for errors meaning the file is not a database this engine can open.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidDatabase | StorageError::InvalidDatabaseVersion(_)
        )
    }
}
