//! Storage backends for the snip URL shortener.
//!
//! Every backend implements [`LinkStore`]; [`open`] picks one from a
//! [`StorageConfig`].

pub mod factory;
pub mod file;
pub mod memory;
pub mod postgres;

pub use factory::{open, StorageConfig};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use snip_core::{LinkStore, ReadStore, StorageError};
