use crate::owner::OwnerId;
use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};

/// A stored mapping between a short code and its original URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub short_code: ShortCode,
    pub original_url: String,
    /// Owner that created the link, if the caller was identified.
    pub owner: Option<OwnerId>,
    /// Soft-delete flag. Once set it is never cleared.
    pub deleted: bool,
}

/// One entry of a batch save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub short_code: ShortCode,
    pub original_url: String,
}

impl NewLink {
    pub fn new(short_code: ShortCode, original_url: impl Into<String>) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
        }
    }
}

/// Aggregate counters over live (not deleted) links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub urls: u64,
    pub users: u64,
}

/// A request to soft-delete some of an owner's links.
///
/// Never persisted; it lives only until the deletion pipeline has handed
/// it to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub owner: OwnerId,
    pub codes: Vec<ShortCode>,
}

impl DeleteRequest {
    pub fn new(owner: OwnerId, codes: Vec<ShortCode>) -> Self {
        Self { owner, codes }
    }

    /// Splits the request into requests of at most `size` codes each.
    ///
    /// A `size` of zero is treated as one.
    pub fn into_chunks(self, size: usize) -> Vec<DeleteRequest> {
        let owner = self.owner;
        self.codes
            .chunks(size.max(1))
            .map(|codes| DeleteRequest::new(owner, codes.to_vec()))
            .collect()
    }
}
