pub mod collection;
pub mod document;
pub mod engine;
pub mod error;
pub mod update;
