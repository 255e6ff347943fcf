//! Header page (logical page 0) and its byte-exact codec.
//!
//! ```text
//! field               size
//! magic               27   "** docstore database file *"
//! format version       1
//! free_empty_page_id   4   u32 LE, 0xFFFFFFFF = none
//! last_page_id         4   u32 LE
//! user_version         2   u16 LE
//! salt                16
//! creation_time        8   i64 LE, unix nanoseconds
//! collection_count     1
//! (name, page_id) * n      u8 length + utf-8 name, u32 LE page id
//! ```
//!
//! The header is a marble object of its own, so it is not bound by the
//! page size: 255 collections with 60-byte names still fit.

use std::collections::HashMap;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};

use super::error::StorageError;
use super::page::{EMPTY_PAGE_ID, PageId};

pub const HEADER_INFO: &[u8; 27] = b"** docstore database file *";
pub const FILE_VERSION: u8 = 7;
pub const SALT_SIZE: usize = 16;
pub const MAX_COLLECTIONS: usize = 255;
pub const MAX_COLLECTION_NAME_LENGTH: usize = 60;

const FIXED_SIZE: usize = 27 + 1 + 4 + 4 + 2 + SALT_SIZE + 8 + 1;

/// Checks that `name` can be stored as a collection name.
pub fn validate_collection_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LENGTH
        && !name.starts_with('$')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid {
        return Err(StorageError::InvalidCollectionName(name.to_owned()));
    }
    Ok(())
}

/// Collection name to metadata page id, unique under case-insensitive comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionMap {
    // lower-cased name -> (name as first stored, page id)
    entries: HashMap<String, (String, PageId)>,
}

impl CollectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<PageId> {
        self.entries
            .get(&Self::normalize(name))
            .map(|(_, page_id)| *page_id)
    }

    /// Adds or repoints an entry. The original casing of an existing entry is kept.
    pub fn insert(&mut self, name: &str, page_id: PageId) -> Result<(), StorageError> {
        validate_collection_name(name)?;

        let key = Self::normalize(name);
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.1 = page_id;
            return Ok(());
        }

        if self.entries.len() >= MAX_COLLECTIONS {
            return Err(StorageError::TooManyCollections);
        }

        self.entries.insert(key, (name.to_owned(), page_id));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<PageId> {
        self.entries
            .remove(&Self::normalize(name))
            .map(|(_, page_id)| page_id)
    }

    /// Entries as `(name, page_id)`, ordered by normalized name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, PageId)> {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        keys.into_iter().map(|key| {
            let (name, page_id) = &self.entries[key];
            (name.as_str(), *page_id)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPage {
    pub free_empty_page_id: PageId,
    pub last_page_id: PageId,
    pub user_version: u16,
    pub salt: [u8; SALT_SIZE],
    pub creation_time: DateTime<Utc>,
    pub collections: CollectionMap,
}

impl HeaderPage {
    /// Header of a freshly created file.
    pub fn new(user_version: u16, salt: [u8; SALT_SIZE]) -> Self {
        Self {
            free_empty_page_id: EMPTY_PAGE_ID,
            last_page_id: 0,
            user_version,
            salt,
            creation_time: Utc::now(),
            collections: CollectionMap::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        if self.collections.len() > MAX_COLLECTIONS {
            return Err(StorageError::TooManyCollections);
        }

        let mut buf = BytesMut::with_capacity(FIXED_SIZE + self.collections.len() * 16);

        buf.put_slice(HEADER_INFO);
        buf.put_u8(FILE_VERSION);
        buf.put_u32_le(self.free_empty_page_id);
        buf.put_u32_le(self.last_page_id);
        buf.put_u16_le(self.user_version);
        buf.put_slice(&self.salt);
        //nanoseconds cover 1677..2262
        let nanos = self.creation_time.timestamp_nanos_opt().ok_or_else(|| {
            StorageError::CorruptHeader(format!(
                "creation time {} is out of range",
                self.creation_time
            ))
        })?;
        buf.put_i64_le(nanos);
        buf.put_u8(self.collections.len() as u8);

        for (name, page_id) in self.collections.iter() {
            if name.len() > u8::MAX as usize {
                return Err(StorageError::InvalidCollectionName(name.to_owned()));
            }
            buf.put_u8(name.len() as u8);
            buf.put_slice(name.as_bytes());
            buf.put_u32_le(page_id);
        }

        Ok(buf.to_vec())
    }

    /// Decodes and validates a header. Nothing is returned unless every field parsed.
    pub fn decode(mut buf: &[u8]) -> Result<Self, StorageError> {
        if buf.remaining() < HEADER_INFO.len() + 1 {
            return Err(StorageError::InvalidDatabase);
        }

        let mut magic = [0u8; 27];
        buf.copy_to_slice(&mut magic);
        if &magic != HEADER_INFO {
            return Err(StorageError::InvalidDatabase);
        }

        let version = buf.get_u8();
        if version != FILE_VERSION {
            return Err(StorageError::InvalidDatabaseVersion(version));
        }

        need(&buf, FIXED_SIZE - HEADER_INFO.len() - 1)?;
        let free_empty_page_id = buf.get_u32_le();
        let last_page_id = buf.get_u32_le();
        let user_version = buf.get_u16_le();
        let mut salt = [0u8; SALT_SIZE];
        buf.copy_to_slice(&mut salt);
        let creation_time = DateTime::from_timestamp_nanos(buf.get_i64_le());
        let count = buf.get_u8();

        let mut collections = CollectionMap::new();
        for _ in 0..count {
            need(&buf, 1)?;
            let len = buf.get_u8() as usize;
            need(&buf, len + 4)?;
            let name = String::from_utf8(buf[..len].to_vec())
                .map_err(|_| StorageError::CorruptHeader("collection name is not utf-8".into()))?;
            buf.advance(len);
            let page_id = buf.get_u32_le();

            if collections.get(&name).is_some() {
                return Err(StorageError::CorruptHeader(format!(
                    "duplicate collection {name}"
                )));
            }
            collections
                .insert(&name, page_id)
                .map_err(|e| StorageError::CorruptHeader(e.to_string()))?;
        }

        Ok(Self {
            free_empty_page_id,
            last_page_id,
            user_version,
            salt,
            creation_time,
            collections,
        })
    }
}

fn need(buf: &&[u8], len: usize) -> Result<(), StorageError> {
    if buf.remaining() < len {
        return Err(StorageError::TruncatedHeader);
    }
    Ok(())
}
