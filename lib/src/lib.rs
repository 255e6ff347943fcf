//! Storage core of an embedded document database.
//!
//! The crate is split into layers, leaves first:
//!
//! - [`storage_layer`]: page codec, header page, marble-backed page store,
//!   transaction-local buffer pool and the data block store.
//! - [`index_layer`]: ordered skip-list indexes stored in index pages.
//! - [`transaction_layer`]: collection-level write locks and atomic commit.
//! - [`executor_layer`]: the update coordinator and the [`Engine`] API.

pub mod config;
pub mod executor_layer;
pub mod index_layer;
pub mod storage_layer;
pub mod transaction_layer;

pub use config::EngineConfig;
pub use executor_layer::engine::Engine;
pub use executor_layer::error::ExecutorError;
