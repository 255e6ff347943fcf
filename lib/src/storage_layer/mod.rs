pub mod buffer_pool;
pub mod collection_page;
pub mod data_store;
pub mod error;
pub mod header;
pub mod indices;
pub mod page;
pub mod paged_storage;
pub mod storage;
pub mod utils;
