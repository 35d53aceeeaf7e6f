use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::store::{ensure_unique_urls, Result};
use snip_core::{
    LinkRecord, LinkStore, NewLink, OwnerId, ReadStore, ShortCode, StorageError, StoreStats,
};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// One line of the storage file.
///
/// A line with `is_deleted` set is a tombstone for the record with the same
/// `short_url`; lines written before tombstones existed simply lack the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileLine {
    user_id: Option<OwnerId>,
    original_url: String,
    short_url: String,
    #[serde(default, skip_serializing_if = "is_false")]
    is_deleted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FileLine {
    fn live(code: &ShortCode, original_url: &str, owner: Option<&OwnerId>) -> Self {
        Self {
            user_id: owner.copied(),
            original_url: original_url.to_owned(),
            short_url: code.to_string(),
            is_deleted: false,
        }
    }

    fn tombstone(record: &LinkRecord) -> Self {
        Self {
            user_id: record.owner,
            original_url: record.original_url.clone(),
            short_url: record.short_code.to_string(),
            is_deleted: true,
        }
    }
}

/// The state obtained by replaying every line of the file.
#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<LinkRecord>,
    by_code: HashMap<String, usize>,
    by_url: HashMap<String, usize>,
}

impl Snapshot {
    fn replay(content: &str) -> Self {
        let mut snapshot = Snapshot::default();

        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FileLine>(line) {
                Ok(line) => snapshot.apply(line),
                Err(e) => trace!(line = number + 1, error = %e, "skipping malformed line"),
            }
        }

        snapshot
    }

    fn apply(&mut self, line: FileLine) {
        if line.is_deleted {
            if let Some(&idx) = self.by_code.get(&line.short_url) {
                self.records[idx].deleted = true;
            }
            return;
        }

        if self.by_url.contains_key(&line.original_url) {
            return;
        }

        self.push(LinkRecord {
            short_code: ShortCode::new_unchecked(line.short_url),
            original_url: line.original_url,
            owner: line.user_id,
            deleted: false,
        });
    }

    fn push(&mut self, record: LinkRecord) {
        let idx = self.records.len();
        self.by_code
            .entry(record.short_code.to_string())
            .or_insert(idx);
        self.by_url.insert(record.original_url.clone(), idx);
        self.records.push(record);
    }

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
}

/// Append-only file implementation of the store contract.
///
/// Every record is one JSON object per line. Reads replay the whole file on
/// each call, so a lookup costs O(n) in the number of lines. Deletes append
/// tombstone lines rather than rewriting the file.
///
/// Writers are serialized by an in-process lock so that the conflict check
/// and the append happen as one step. Two processes sharing one file are
/// not coordinated.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`, creating the parent directory and the file
    /// if they do not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), "opened file store");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the path of the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Snapshot> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Snapshot::replay(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the file is empty or its last line is terminated.
    async fn ends_with_newline(&self) -> Result<bool> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.len() == 0 {
            return Ok(true);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1)).await?;
        file.read_exact(&mut last).await?;
        Ok(last[0] == b'\n')
    }

    /// Appends `lines` with a single write.
    ///
    /// An unterminated last line, left by a torn write or a hand edit, is
    /// closed first so the new lines never merge into it.
    async fn append(&self, lines: &[FileLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        if !self.ends_with_newline().await? {
            debug!(path = %self.path.display(), "terminating unfinished last line");
            buf.push('\n');
        }
        for line in lines {
            let encoded = serde_json::to_string(line)
                .map_err(|e| StorageError::InvalidData(e.to_string()))?;
            buf.push_str(&encoded);
            buf.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl ReadStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let snapshot = self.load().await?;

        let Some(record) = snapshot.find(key) else {
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
        let snapshot = self.load().await?;
        Ok(snapshot
            .records
            .into_iter()
            .filter(|record| record.owner.as_ref() == Some(owner))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let snapshot = self.load().await?;

        let mut urls = 0;
        let mut owners = HashSet::new();
        for record in snapshot.records.iter().filter(|record| !record.deleted) {
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
impl LinkStore for FileStore {
    async fn save(
        &self,
        original_url: &str,
        code: &ShortCode,
        owner: Option<&OwnerId>,
    ) -> Result<ShortCode> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.load().await?;

        if let Some(existing) = snapshot.existing_code(original_url) {
            return Err(StorageError::Conflict {
                code: existing.to_string(),
            });
        }

        self.append(&[FileLine::live(code, original_url, owner)])
            .await?;
        Ok(code.clone())
    }

    async fn save_batch(
        &self,
        links: &[NewLink],
        owner: Option<&OwnerId>,
    ) -> Result<Vec<ShortCode>> {
        ensure_unique_urls(links)?;

        let _guard = self.write_lock.lock().await;
        let snapshot = self.load().await?;

        let mut codes = Vec::with_capacity(links.len());
        let mut lines = Vec::new();
        for link in links {
            match snapshot.existing_code(&link.original_url) {
                Some(existing) => codes.push(existing.clone()),
                None => {
                    lines.push(FileLine::live(&link.short_code, &link.original_url, owner));
                    codes.push(link.short_code.clone());
                }
            }
        }

        self.append(&lines).await?;
        debug!(
            batch = links.len(),
            appended = lines.len(),
            "saved batch to file store"
        );
        Ok(codes)
    }

    async fn delete_batch(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load().await?;

        let mut tombstones = Vec::new();
        for code in codes {
            let Some(&idx) = snapshot.by_code.get(code.as_str()) else {
                continue;
            };
            let record = &mut snapshot.records[idx];
            if record.owner.as_ref() == Some(owner) && !record.deleted {
                record.deleted = true;
                tombstones.push(FileLine::tombstone(record));
            }
        }

        self.append(&tombstones).await?;
        Ok(tombstones.len() as u64)
    }
}
