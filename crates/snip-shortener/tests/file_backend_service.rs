//! Service and deletion pipeline over the file backend, reopened between
//! steps the way separate process runs would see it.

use snip_core::OwnerId;
use snip_shortener::{
    BatchShortenRequest, DrainOutcome, ShortenStatus, Shortener, ShortenerConfig,
    ShortenerError, ShortenerService,
};
use snip_storage::StorageConfig;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

async fn service(path: &Path) -> ShortenerService<dyn snip_storage::LinkStore> {
    let config = StorageConfig::from_settings(None, Some(path.to_path_buf()));
    let store = snip_storage::open(&config).await.unwrap();
    ShortenerService::new(store, ShortenerConfig::default())
}

#[tokio::test]
async fn deletion_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("urls.json");
    let owner = OwnerId::random();

    let first = service(&path).await;
    let shortened = first.shorten("https://ya.ru", Some(&owner)).await.unwrap();
    assert_eq!(shortened.status, ShortenStatus::Created);
    first
        .delete_urls(Some(&owner), vec!["6YGS4ZUF".to_string()])
        .unwrap();
    assert_eq!(
        first.shutdown(Duration::from_secs(5)).await,
        DrainOutcome::Drained
    );

    let second = service(&path).await;
    let err = second.decode("6YGS4ZUF").await.unwrap_err();
    assert!(matches!(err, ShortenerError::Gone(_)));
    assert!(second.user_urls(Some(&owner)).await.unwrap().is_empty());

    // the URL keeps its code even though the link is gone
    let again = second.shorten("https://ya.ru", Some(&owner)).await.unwrap();
    assert_eq!(again.status, ShortenStatus::Conflict);
    assert_eq!(again.code.as_str(), "6YGS4ZUF");
}

#[tokio::test]
async fn batch_is_visible_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.json");
    let owner = OwnerId::random();

    let first = service(&path).await;
    let responses = first
        .shorten_batch(
            vec![
                BatchShortenRequest {
                    correlation_id: "1".to_string(),
                    original_url: "https://example.com".to_string(),
                },
                BatchShortenRequest {
                    correlation_id: "2".to_string(),
                    original_url: "https://example.com".to_string(),
                },
                BatchShortenRequest {
                    correlation_id: "3".to_string(),
                    original_url: "https://ya.ru".to_string(),
                },
            ],
            Some(&owner),
        )
        .await
        .unwrap();
    assert_eq!(responses[0].short_url, responses[1].short_url);
    first.shutdown(Duration::from_secs(1)).await;

    let second = service(&path).await;
    assert_eq!(
        second.decode("yYTQaq--").await.unwrap().as_deref(),
        Some("https://example.com")
    );
    assert_eq!(second.user_urls(Some(&owner)).await.unwrap().len(), 2);
    let stats = second.stats().await.unwrap();
    assert_eq!((stats.urls, stats.users), (2, 1));
}
