//! URL shortener service implementation.
//!
//! This crate provides the encode/decode service on top of a
//! `snip_core::LinkStore` and the asynchronous deletion pipeline it
//! hands delete requests to.

pub mod deletion;
pub mod error;
pub mod service;
pub mod shortener;

pub use deletion::{DeletionConfig, DeletionPipeline, DrainOutcome, PipelineState};
pub use error::{DeletionError, ShortenerError};
pub use service::{ShortenerConfig, ShortenerService};
pub use shortener::{
    BatchShortenRequest, BatchShortenResponse, ShortenStatus, Shortened, Shortener, UserUrl,
};
