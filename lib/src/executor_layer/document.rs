//! Collaborators at the document boundary: the byte codec for documents and
//! the key extractors behind secondary indexes.

use serde_json::Value;

use super::super::index_layer::key::IndexKey;
use super::super::storage_layer::collection_page::ID_FIELD;
use super::error::ExecutorError;

pub type Document = Value;

/// Turns documents into the bytes kept in data blocks and back.
pub trait DocumentCodec: Send + Sync {
    fn encode(&self, document: &Document) -> Result<Vec<u8>, ExecutorError>;
    fn decode(&self, data: &[u8]) -> Result<Document, ExecutorError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn encode(&self, document: &Document) -> Result<Vec<u8>, ExecutorError> {
        serde_json::to_vec(document).map_err(|e| ExecutorError::Codec(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<Document, ExecutorError> {
        serde_json::from_slice(data).map_err(|e| ExecutorError::Codec(e.to_string()))
    }
}

/// Computes the keys one index stores for a document. A document may yield
/// no key, one key, or several.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, document: &Document) -> Vec<IndexKey>;
}

/// Builds the extractor for an index expression.
pub trait KeyExtractorFactory: Send + Sync {
    fn create(&self, expression: &str) -> Result<Box<dyn KeyExtractor>, ExecutorError>;
}

/// Extracts the value at a `$.a.b` field path.
///
/// Arrays along the path fan out into one key per element. A missing field
/// yields a single `Null` key. Objects at the end of the path yield nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPathExtractor {
    path: Vec<String>,
}

impl FieldPathExtractor {
    pub fn parse(expression: &str) -> Result<Self, ExecutorError> {
        let invalid = || ExecutorError::InvalidExpression(expression.to_owned());

        let rest = expression.trim().strip_prefix("$.").ok_or_else(invalid)?;
        let path: Vec<String> = rest.split('.').map(str::to_owned).collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(invalid());
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    fn collect(value: &Value, path: &[String], keys: &mut Vec<IndexKey>) {
        let Some((field, rest)) = path.split_first() else {
            match value {
                Value::Array(items) => keys.extend(items.iter().filter_map(IndexKey::from_json)),
                _ => keys.extend(IndexKey::from_json(value)),
            }
            return;
        };

        match value {
            Value::Object(map) => match map.get(field) {
                Some(inner) => Self::collect(inner, rest, keys),
                None => keys.push(IndexKey::Null),
            },
            Value::Array(items) => {
                for item in items {
                    Self::collect(item, path, keys);
                }
            }
            _ => keys.push(IndexKey::Null),
        }
    }
}

impl KeyExtractor for FieldPathExtractor {
    fn extract(&self, document: &Document) -> Vec<IndexKey> {
        let mut keys = vec![];
        Self::collect(document, &self.path, &mut keys);
        keys
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPathFactory;

impl KeyExtractorFactory for FieldPathFactory {
    fn create(&self, expression: &str) -> Result<Box<dyn KeyExtractor>, ExecutorError> {
        Ok(Box::new(FieldPathExtractor::parse(expression)?))
    }
}

/// Reads the identity field. It must be a scalar other than null and the
/// reserved boundary keys.
pub fn document_id(document: &Document) -> Result<IndexKey, ExecutorError> {
    let value = document.get(ID_FIELD).cloned().unwrap_or(Value::Null);

    match IndexKey::from_json(&value) {
        Some(key) if !key.is_null() && !key.is_sentinel() => Ok(key),
        _ => Err(ExecutorError::InvalidDataType {
            field: ID_FIELD.to_owned(),
            value,
        }),
    }
}
