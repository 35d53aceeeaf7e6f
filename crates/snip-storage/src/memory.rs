use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::store::{ensure_unique_urls, Result};
use snip_core::{
    LinkRecord, LinkStore, NewLink, OwnerId, ReadStore, ShortCode, StorageError, StoreStats,
};
use std::collections::{HashMap, HashSet};

/// Records in insertion order plus an index over each lookup key.
#[derive(Debug, Default)]
struct Inner {
    records: Vec<LinkRecord>,
    by_code: HashMap<String, usize>,
    by_url: HashMap<String, usize>,
}

impl Inner {
    fn find(&self, key: &str) -> Option<&LinkRecord> {
        self.by_code
            .get(key)
            .or_else(|| self.by_url.get(key))
            .map(|&idx| &self.records[idx])
    }

    fn existing_code(&self, original_url: &str) -> Option<&ShortCode> {
        self.by_url
            .get(original_url)
            .map(|&idx| &self.records[idx].short_code)
    }

    fn push(&mut self, record: LinkRecord) {
        let idx = self.records.len();
        // on a code collision the first record keeps the code
        self.by_code
            .entry(record.short_code.as_str().to_owned())
            .or_insert(idx);
        self.by_url.insert(record.original_url.clone(), idx);
        self.records.push(record);
    }
}

/// In-memory implementation of the store contract.
///
/// Nothing is persisted. Both indexes live behind a single lock so a batch
/// is applied atomically and the two lookup directions never disagree.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read();

        let Some(record) = inner.find(key) else {
            return Ok(None);
        };

        if record.deleted {
            return Err(StorageError::AlreadyDeleted(key.to_owned()));
        }

        if record.short_code.as_str() == key {
            Ok(Some(record.original_url.clone()))
        } else {
            Ok(Some(record.short_code.to_string()))
        }
    }

    async fn get_all_by_owner(&self, owner: &OwnerId) -> Result<Vec<LinkRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .records
            .iter()
            .filter(|record| record.owner.as_ref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read();
        let live = inner.records.iter().filter(|record| !record.deleted);

        let mut urls = 0;
        let mut owners = HashSet::new();
        for record in live {
            urls += 1;
            if let Some(owner) = record.owner {
                owners.insert(owner);
            }
        }

        Ok(StoreStats {
            urls,
            users: owners.len() as u64,
        })
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn save(
        &self,
        original_url: &str,
        code: &ShortCode,
        owner: Option<&OwnerId>,
    ) -> Result<ShortCode> {
        let mut inner = self.inner.write();

        if let Some(existing) = inner.existing_code(original_url) {
            return Err(StorageError::Conflict {
                code: existing.to_string(),
            });
        }

        inner.push(LinkRecord {
            short_code: code.clone(),
            original_url: original_url.to_owned(),
            owner: owner.copied(),
            deleted: false,
        });

        Ok(code.clone())
    }

    async fn save_batch(
        &self,
        links: &[NewLink],
        owner: Option<&OwnerId>,
    ) -> Result<Vec<ShortCode>> {
        ensure_unique_urls(links)?;

        let mut inner = self.inner.write();
        let mut codes = Vec::with_capacity(links.len());

        for link in links {
            match inner.existing_code(&link.original_url) {
                Some(existing) => codes.push(existing.clone()),
                None => {
                    inner.push(LinkRecord {
                        short_code: link.short_code.clone(),
                        original_url: link.original_url.clone(),
                        owner: owner.copied(),
                        deleted: false,
                    });
                    codes.push(link.short_code.clone());
                }
            }
        }

        Ok(codes)
    }

    async fn delete_batch(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<u64> {
        let mut inner = self.inner.write();
        let mut deleted = 0;

        for code in codes {
            let Some(&idx) = inner.by_code.get(code.as_str()) else {
                continue;
            };
            let record = &mut inner.records[idx];
            if record.owner.as_ref() == Some(owner) && !record.deleted {
                record.deleted = true;
                deleted += 1;
            }
        }

        Ok(deleted)
    }
}
