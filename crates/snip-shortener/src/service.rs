use crate::deletion::{DeletionConfig, DeletionPipeline, DrainOutcome};
use crate::error::{Result, ShortenerError};
use crate::shortener::{
    BatchShortenRequest, BatchShortenResponse, ShortenStatus, Shortened, Shortener, UserUrl,
};
use async_trait::async_trait;
use snip_core::{
    DeleteRequest, LinkStore, NewLink, OwnerId, ShortCode, StorageError, StoreStats,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerConfig {
    /// Prefix of every short URL handed out, without a trailing slash.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    #[builder(default)]
    pub deletion: DeletionConfig,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The `Shortener` implementation backed by a `LinkStore`.
///
/// Short codes are derived from the URL itself, so saving a URL twice
/// yields the same code and the second save reports a conflict. Deletions
/// go through a `DeletionPipeline` owned by the service.
pub struct ShortenerService<S: ?Sized> {
    store: Arc<S>,
    deletion: DeletionPipeline,
    base_url: String,
}

impl<S: LinkStore + ?Sized> ShortenerService<S> {
    /// Creates the service and starts its deletion workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<S>, config: ShortenerConfig) -> Self {
        let deletion = DeletionPipeline::start(Arc::clone(&store), config.deletion);
        Self {
            store,
            deletion,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn short_code(&self, original_url: &str) -> ShortCode {
        ShortCode::from_url(original_url)
    }

    /// Stops accepting deletions and drains the ones already queued.
    pub async fn shutdown(&self, grace: Duration) -> DrainOutcome {
        self.deletion.shutdown(grace).await
    }

    /// Accepts absolute http(s) URLs with a host.
    fn validate_url(url: &str) -> Result<()> {
        let parsed =
            Url::parse(url).map_err(|e| ShortenerError::InvalidUrl(format!("{url}: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a host: {url}"
            )));
        }

        Ok(())
    }

    /// The code to store for `url`: the one already stored, if any.
    async fn probe(&self, url: &str) -> Result<ShortCode> {
        match self.store.get(url).await {
            Ok(Some(existing)) => Ok(ShortCode::new_unchecked(existing)),
            // deleted links still own their URL; the store converges on it
            Ok(None) | Err(StorageError::AlreadyDeleted(_)) => Ok(self.short_code(url)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<S: LinkStore + ?Sized> Shortener for ShortenerService<S> {
    async fn shorten(&self, original_url: &str, owner: Option<&OwnerId>) -> Result<Shortened> {
        Self::validate_url(original_url)?;
        let code = self.short_code(original_url);

        let (code, status) = match self.store.save(original_url, &code, owner).await {
            Ok(code) => (code, ShortenStatus::Created),
            Err(StorageError::Conflict { code }) => {
                debug!(url = %original_url, code = %code, "url already shortened");
                (ShortCode::new_unchecked(code), ShortenStatus::Conflict)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Shortened {
            url: code.to_url(&self.base_url),
            code,
            status,
        })
    }

    async fn decode(&self, code: &str) -> Result<Option<String>> {
        trace!(code = %code, "decoding short code");
        Ok(self.store.get(code).await?)
    }

    async fn shorten_batch(
        &self,
        requests: Vec<BatchShortenRequest>,
        owner: Option<&OwnerId>,
    ) -> Result<Vec<BatchShortenResponse>> {
        for request in &requests {
            Self::validate_url(&request.original_url)?;
        }

        let mut links: Vec<NewLink> = Vec::with_capacity(requests.len());
        let mut slots: HashMap<&str, usize> = HashMap::with_capacity(requests.len());
        for request in &requests {
            let url = request.original_url.as_str();
            if slots.contains_key(url) {
                continue;
            }
            let code = self.probe(url).await?;
            slots.insert(url, links.len());
            links.push(NewLink::new(code, url));
        }

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let codes = self.store.save_batch(&links, owner).await?;
        if codes.len() != links.len() {
            return Err(ShortenerError::Storage(StorageError::BatchMismatch {
                expected: links.len(),
                actual: codes.len(),
            }));
        }
        debug!(
            requests = requests.len(),
            distinct = links.len(),
            "batch shortened"
        );

        let responses = requests
            .iter()
            .map(|request| {
                let code = &codes[slots[request.original_url.as_str()]];
                BatchShortenResponse {
                    correlation_id: request.correlation_id.clone(),
                    short_url: code.to_url(&self.base_url),
                }
            })
            .collect();
        Ok(responses)
    }

    async fn user_urls(&self, owner: Option<&OwnerId>) -> Result<Vec<UserUrl>> {
        let owner = owner.ok_or(ShortenerError::Unauthorized)?;
        let records = self.store.get_all_by_owner(owner).await?;

        Ok(records
            .into_iter()
            .filter(|record| !record.deleted)
            .map(|record| UserUrl {
                short_url: record.short_code.to_url(&self.base_url),
                original_url: record.original_url,
            })
            .collect())
    }

    fn delete_urls(&self, owner: Option<&OwnerId>, codes: Vec<String>) -> Result<()> {
        let owner = *owner.ok_or(ShortenerError::Unauthorized)?;

        let codes = codes
            .into_iter()
            .filter_map(|code| match ShortCode::new(code) {
                Ok(code) => Some(code),
                Err(e) => {
                    warn!(owner = %owner, error = %e, "skipping malformed short code");
                    None
                }
            })
            .collect();

        self.deletion.submit(DeleteRequest::new(owner, codes))?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats().await?)
    }
}
