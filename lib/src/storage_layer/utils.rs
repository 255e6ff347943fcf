use super::error::StorageError;
use super::page::PageId;
use bincode::{Decode, Encode, config};
use marble::Marble;

/// Fixed-width integers keep an item's encoded size stable when only its
/// addresses change, so rewriting a node in place never overflows its page.
pub const BINCODE_CONFIG: config::Configuration<config::LittleEndian, config::Fixint> =
    config::standard().with_fixed_int_encoding();

pub fn encode<T: Encode>(item: &T) -> Result<Vec<u8>, StorageError> {
    Ok(bincode::encode_to_vec(item, BINCODE_CONFIG)?)
}

pub fn decode<T: Decode<()>>(data: &[u8]) -> Result<T, StorageError> {
    let (item, _): (T, usize) = bincode::decode_from_slice(data, BINCODE_CONFIG)?;
    Ok(item)
}

pub fn load<T: Decode<()>>(marble: &Marble, id: PageId) -> Result<Option<T>, StorageError> {
    match marble.read(u64::from(id))? {
        Some(data) => Ok(Some(decode(&data[..])?)),
        None => Ok(None),
    }
}
