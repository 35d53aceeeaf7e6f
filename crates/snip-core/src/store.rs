use crate::error::StorageError;
use crate::owner::OwnerId;
use crate::record::{LinkRecord, NewLink, StoreStats};
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A read-only view of a link store.
///
/// Lookups are symmetric: a key may be either a short code or an original
/// URL, and the counterpart value is returned.
#[async_trait]
pub trait ReadStore: Send + Sync + 'static {
    /// Resolves `key` to its counterpart.
    ///
    /// * `Ok(Some(value))` - the original URL for a code, or the code for a URL
    /// * `Ok(None)` - nothing matches `key`
    /// * `Err(StorageError::AlreadyDeleted)` - the matched record is soft-deleted
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns every record created by `owner`, deleted ones included.
    async fn get_all_by_owner(&self, owner: &OwnerId) -> Result<Vec<LinkRecord>>;

    /// Checks that the underlying medium is reachable.
    async fn ping(&self) -> Result<()>;

    /// Counts live links and distinct owners.
    async fn stats(&self) -> Result<StoreStats>;
}

#[async_trait]
pub trait LinkStore: ReadStore {
    /// Saves a new mapping and returns the stored code.
    ///
    /// Returns `Err(StorageError::Conflict)` carrying the existing code when
    /// `original_url` is already stored, whoever owns it.
    async fn save(
        &self,
        original_url: &str,
        code: &ShortCode,
        owner: Option<&OwnerId>,
    ) -> Result<ShortCode>;

    /// Saves all `links` or none of them.
    ///
    /// Returns one code per input, in input order. A URL that is already
    /// stored converges to its existing code instead of failing the batch.
    async fn save_batch(&self, links: &[NewLink], owner: Option<&OwnerId>)
        -> Result<Vec<ShortCode>>;

    /// Soft-deletes the records among `codes` that belong to `owner`.
    ///
    /// Codes owned by someone else, unknown codes and already deleted
    /// records are skipped without error. Returns the number of records
    /// newly marked as deleted.
    async fn delete_batch(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<u64>;
}

/// Rejects a batch that names the same original URL twice.
///
/// Such a batch can never be committed as a whole, so backends refuse it
/// before touching any state.
pub fn ensure_unique_urls(links: &[NewLink]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(links.len());
    for link in links {
        if !seen.insert(link.original_url.as_str()) {
            return Err(StorageError::DuplicateInBatch(link.original_url.clone()));
        }
    }
    Ok(())
}
