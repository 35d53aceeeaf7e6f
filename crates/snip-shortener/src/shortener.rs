use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::{OwnerId, ShortCode, StoreStats};

/// Whether a shorten call created the link or found it already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortenStatus {
    Created,
    /// The URL was stored before; the existing code is returned.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortened {
    /// Absolute short URL, `<base_url>/<code>`.
    pub url: String,
    pub code: ShortCode,
    pub status: ShortenStatus,
}

impl Shortened {
    pub fn is_conflict(&self) -> bool {
        self.status == ShortenStatus::Conflict
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchShortenRequest {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchShortenResponse {
    pub correlation_id: String,
    pub short_url: String,
}

/// One live link of a caller, as listed back to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Caller-facing operations of the shortener.
///
/// Owners are optional wherever the caller may be anonymous; operations
/// scoped to an owner fail with `Unauthorized` without one.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens `original_url`, reporting a conflict if it was stored before.
    async fn shorten(&self, original_url: &str, owner: Option<&OwnerId>) -> Result<Shortened>;

    /// Resolves a short code to its original URL.
    async fn decode(&self, code: &str) -> Result<Option<String>>;

    /// Shortens every request or none of them.
    async fn shorten_batch(
        &self,
        requests: Vec<BatchShortenRequest>,
        owner: Option<&OwnerId>,
    ) -> Result<Vec<BatchShortenResponse>>;

    /// Lists the caller's links that are not deleted.
    async fn user_urls(&self, owner: Option<&OwnerId>) -> Result<Vec<UserUrl>>;

    /// Schedules deletion of the caller's codes and returns immediately.
    fn delete_urls(&self, owner: Option<&OwnerId>, codes: Vec<String>) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}
