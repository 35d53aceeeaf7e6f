//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the link record model, the content-addressed
//! short code, the opaque owner identifier and the store contract that
//! every storage backend implements.

pub mod error;
pub mod owner;
pub mod record;
pub mod shortcode;
pub mod store;

pub use error::{CoreError, StorageError};
pub use owner::OwnerId;
pub use record::{DeleteRequest, LinkRecord, NewLink, StoreStats};
pub use shortcode::ShortCode;
pub use store::{LinkStore, ReadStore};
